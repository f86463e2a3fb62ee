//! Raw export ingestion
//!
//! The tracker exports one record set per experiment, holding every
//! participant's rows. This module regroups them into one record set per
//! participant, tagging each row with its experiment.

use crate::error::GazeError;
use crate::sanitize::{RowSanitizer, RAW_EXPORT_COLUMNS};
use crate::store::{RecordStore, SkippedRecordSet};
use crate::types::{EyeCategory, GazePoint, ParticipantSnapshot, Sample};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Row of a raw per-experiment export
#[derive(Debug, Deserialize)]
struct RawExportRow {
    #[serde(rename = "RecordingTime [ms]")]
    recording_time: Option<String>,
    #[serde(rename = "Participant")]
    participant: Option<String>,
    #[serde(rename = "Stimulus")]
    stimulus: String,
    #[serde(rename = "Category Right")]
    category_right: String,
    #[serde(rename = "Category Left")]
    category_left: String,
    #[serde(rename = "Point of Regard Right X [px]")]
    right_x: Option<String>,
    #[serde(rename = "Point of Regard Right Y [px]")]
    right_y: Option<String>,
    #[serde(rename = "Point of Regard Left X [px]")]
    left_x: Option<String>,
    #[serde(rename = "Point of Regard Left Y [px]")]
    left_y: Option<String>,
}

impl RawExportRow {
    /// `None` when the row has no usable participant ID
    fn into_sample(self, experiment: &str) -> Option<Sample> {
        let participant = RowSanitizer::participant(self.participant.as_deref())?;
        Some(Sample::new(
            participant,
            experiment,
            self.stimulus,
            EyeCategory::parse(&self.category_left),
            EyeCategory::parse(&self.category_right),
            GazePoint {
                x: RowSanitizer::coordinate(self.right_x.as_deref()),
                y: RowSanitizer::coordinate(self.right_y.as_deref()),
            },
            GazePoint {
                x: RowSanitizer::coordinate(self.left_x.as_deref()),
                y: RowSanitizer::coordinate(self.left_y.as_deref()),
            },
            RowSanitizer::timestamp(self.recording_time.as_deref()),
        ))
    }
}

/// One experiment's export, already parsed
#[derive(Debug, Clone)]
pub struct ExperimentExport {
    pub experiment: String,
    pub samples: Vec<Sample>,
}

/// Ingester for raw per-experiment exports
pub struct RawFileIngester;

impl RawFileIngester {
    /// Parse one export; `experiment` becomes every row's experiment ID
    pub fn read_export<R: Read>(reader: R, experiment: &str) -> Result<ExperimentExport, GazeError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        RowSanitizer::check_columns(headers.iter(), &RAW_EXPORT_COLUMNS, experiment)?;

        let mut samples = Vec::new();
        for (idx, row) in reader.deserialize::<RawExportRow>().enumerate() {
            match row?.into_sample(experiment) {
                Some(sample) => samples.push(sample),
                None => warn!(experiment, row = idx + 1, "row without participant ID skipped"),
            }
        }

        Ok(ExperimentExport {
            experiment: experiment.to_string(),
            samples,
        })
    }

    /// Concatenate each participant's rows across exports, in export order
    pub fn group_by_participant(exports: Vec<ExperimentExport>) -> ParticipantSnapshot {
        let mut snapshot = ParticipantSnapshot::new();
        for export in exports {
            for sample in export.samples {
                snapshot.entry(sample.participant).or_default().push(sample);
            }
        }
        snapshot
    }

    /// Read every `<experiment>.csv` in `dir` (sorted by name) and group by participant.
    ///
    /// Exports with missing columns or unreadable rows are skipped and reported.
    pub fn ingest_dir(
        dir: &Path,
    ) -> Result<(ParticipantSnapshot, Vec<SkippedRecordSet>), GazeError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();

        let mut exports = Vec::new();
        let mut skipped = Vec::new();
        for path in files {
            let experiment = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            match File::open(&path)
                .map_err(GazeError::from)
                .and_then(|file| Self::read_export(file, &experiment))
            {
                Ok(export) => exports.push(export),
                Err(e) if e.is_local() => {
                    warn!(experiment = experiment.as_str(), error = %e, "skipping experiment export");
                    skipped.push(SkippedRecordSet {
                        record_set: experiment,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let snapshot = Self::group_by_participant(exports);
        info!(
            participants = snapshot.len(),
            skipped = skipped.len(),
            "experiment exports ingested"
        );
        Ok((snapshot, skipped))
    }

    /// Ingest `dir` and store one record set per participant
    pub fn ingest_into<S: RecordStore>(
        dir: &Path,
        store: &mut S,
    ) -> Result<Vec<SkippedRecordSet>, GazeError> {
        let (snapshot, skipped) = Self::ingest_dir(dir)?;
        for (participant, samples) in &snapshot {
            store.save_participant(*participant, samples)?;
        }
        Ok(skipped)
    }
}
