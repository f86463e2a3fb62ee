//! Pipeline configuration
//!
//! Every field has a default, so an empty JSON object is a valid configuration.

use crate::error::GazeError;
use serde::{Deserialize, Serialize};

/// Default spacing of the snapped-time grid (ms)
pub const DEFAULT_GRID_INTERVAL_MS: f64 = 20.0;

/// Default class label of the clinical group in participant metadata
pub const DEFAULT_CLINICAL_LABEL: &str = "ASD";

/// Default class label of the typical group in participant metadata
pub const DEFAULT_TYPICAL_LABEL: &str = "TD";

/// P-value thresholds for one, two and three significance stars
pub const DEFAULT_SIGNIFICANCE_LEVELS: [f64; 3] = [0.05, 0.01, 0.001];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Spacing of the snapped-time grid (ms)
    pub grid_interval_ms: f64,
    /// Metadata class of the clinical group
    pub clinical_label: String,
    /// Metadata class of the typical group
    pub typical_label: String,
    /// Descending p-value thresholds for `*`, `**`, `***`
    pub significance_levels: [f64; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid_interval_ms: DEFAULT_GRID_INTERVAL_MS,
            clinical_label: DEFAULT_CLINICAL_LABEL.to_string(),
            typical_label: DEFAULT_TYPICAL_LABEL.to_string(),
            significance_levels: DEFAULT_SIGNIFICANCE_LEVELS,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, GazeError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, GazeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), GazeError> {
        if !(self.grid_interval_ms.is_finite() && self.grid_interval_ms > 0.0) {
            return Err(GazeError::InvalidConfig(format!(
                "grid_interval_ms must be positive, got {}",
                self.grid_interval_ms
            )));
        }
        if self.clinical_label == self.typical_label {
            return Err(GazeError::InvalidConfig(
                "clinical and typical labels must differ".to_string(),
            ));
        }
        let [one, two, three] = self.significance_levels;
        if !(one > two && two > three && three > 0.0 && one < 1.0) {
            return Err(GazeError::InvalidConfig(format!(
                "significance levels must be strictly descending in (0, 1), got {:?}",
                self.significance_levels
            )));
        }
        Ok(())
    }
}
