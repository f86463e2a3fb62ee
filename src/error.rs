//! Error types for gazepath

use thiserror::Error;

/// Errors that can occur while loading, processing or persisting gaze records
#[derive(Debug, Error)]
pub enum GazeError {
    #[error("Missing columns {columns:?} in record set {record_set}")]
    MissingSchema {
        record_set: String,
        columns: Vec<String>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record set not found: {0}")]
    NotFound(String),
}

impl GazeError {
    /// Whether this error only affects a single record set and the run may continue
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            GazeError::MissingSchema { .. }
                | GazeError::NotFound(_)
                | GazeError::Csv(_)
        )
    }
}
