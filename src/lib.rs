//! gazepath - Gaze-path normalization and deviation for eye-tracking studies
//!
//! gazepath turns per-participant eye-tracking record sets into comparable gaze
//! paths through a deterministic pipeline: time normalization → grid snapping
//! → per-stimulus reference paths → per-sample deviation → segment statistics.
//!
//! ## Modules
//!
//! - **Core**: `normalizer`, `snapper`, `averager`, `deviation`, `aggregator`
//! - **Record sets**: `ingest` for raw per-experiment exports, `store` for
//!   participant records and results
//! - **Analysis**: `stats` for the clinical vs typical group comparison

pub mod aggregator;
pub mod averager;
pub mod config;
pub mod deviation;
pub mod error;
pub mod ingest;
pub mod normalizer;
pub mod pipeline;
pub mod sanitize;
pub mod snapper;
pub mod stats;
pub mod store;
pub mod types;

pub use config::PipelineConfig;
pub use error::GazeError;
pub use ingest::RawFileIngester;
pub use pipeline::{
    compute_deviations, compute_reference_paths, normalize_and_snap, GazeProcessor, RunReport,
};
pub use store::{CsvRecordStore, MemoryRecordStore, RecordStore};
pub use types::{
    EyeCategory, GazeDeviation, GazePoint, ParticipantSnapshot, ReferencePath, ReferencePaths,
    Sample,
};

/// gazepath version, recorded alongside run reports
pub const GAZEPATH_VERSION: &str = env!("CARGO_PKG_VERSION");
