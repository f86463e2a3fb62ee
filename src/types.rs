//! Core types for the gazepath pipeline
//!
//! This module defines the records that flow through each stage of the pipeline:
//! gaze samples with their derived timing and deviation fields, per-stimulus
//! reference paths, and the experiment/participant statistics built from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Participant identifier as exported by the eye tracker
pub type ParticipantId = i64;

/// All samples of one run keyed by participant, loaded once and passed explicitly
pub type ParticipantSnapshot = BTreeMap<ParticipantId, Vec<Sample>>;

/// Eye-movement category reported by the tracker for one eye
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EyeCategory {
    Fixation,
    Saccade,
    Blink,
    Separator,
    Other(String),
}

impl EyeCategory {
    /// Parse a category label. Matching is case-insensitive, so the tracker's
    /// `Blink` and a hand-edited `blink` are the same category.
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "fixation" => EyeCategory::Fixation,
            "saccade" => EyeCategory::Saccade,
            "blink" => EyeCategory::Blink,
            "separator" => EyeCategory::Separator,
            _ => EyeCategory::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EyeCategory::Fixation => "Fixation",
            EyeCategory::Saccade => "Saccade",
            EyeCategory::Blink => "Blink",
            EyeCategory::Separator => "Separator",
            EyeCategory::Other(label) => label,
        }
    }
}

impl From<String> for EyeCategory {
    fn from(label: String) -> Self {
        EyeCategory::parse(&label)
    }
}

impl From<EyeCategory> for String {
    fn from(category: EyeCategory) -> Self {
        category.as_str().to_string()
    }
}

/// Point of regard for one eye (px).
///
/// A coordinate is `None` when the exported value could not be read as a number.
/// `(0, 0)` is the tracker's "no signal" value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl GazePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    /// Both coordinates, if both are present
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }

    /// True when both coordinates are present and exactly zero
    pub fn is_zero(&self) -> bool {
        self.x == Some(0.0) && self.y == Some(0.0)
    }

    /// True when at least one coordinate carries a non-zero value
    pub fn has_signal(&self) -> bool {
        [self.x, self.y]
            .iter()
            .any(|value| matches!(value, Some(v) if *v != 0.0))
    }

    /// Euclidean distance to `other`, `None` if either point is incomplete
    pub fn distance_to(&self, other: &GazePoint) -> Option<f64> {
        let (x1, y1) = self.coords()?;
        let (x2, y2) = other.coords()?;
        Some(((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt())
    }
}

/// Deviation of one sample from the reference path (px).
///
/// A per-eye value of 0 means that eye had no usable signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeDeviation {
    pub right: f64,
    pub left: f64,
    pub overall: f64,
}

/// One gaze-tracking reading plus the fields derived by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub participant: ParticipantId,
    pub experiment: String,
    pub stimulus: String,
    pub category_left: EyeCategory,
    pub category_right: EyeCategory,
    pub right: GazePoint,
    pub left: GazePoint,
    /// Timestamp as exported (ms)
    pub recording_time_ms: f64,
    /// Zero-based per (participant, experiment)
    pub normalized_time_ms: Option<f64>,
    /// Zero-based per (participant, experiment, stimulus)
    pub stimulus_time_ms: Option<f64>,
    /// Time until the next sample of the same experiment run
    pub duration_ms: Option<f64>,
    /// Grid label owned by this sample, if it was chosen as representative
    pub snapped_time: Option<i64>,
    /// `None` until the deviation calculator resolved a reference point
    pub deviation: Option<GazeDeviation>,
}

impl Sample {
    /// Create a raw sample without any derived fields
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        participant: ParticipantId,
        experiment: impl Into<String>,
        stimulus: impl Into<String>,
        category_left: EyeCategory,
        category_right: EyeCategory,
        right: GazePoint,
        left: GazePoint,
        recording_time_ms: f64,
    ) -> Self {
        Self {
            participant,
            experiment: experiment.into(),
            stimulus: stimulus.into(),
            category_left,
            category_right,
            right,
            left,
            recording_time_ms,
            normalized_time_ms: None,
            stimulus_time_ms: None,
            duration_ms: None,
            snapped_time: None,
            deviation: None,
        }
    }

    /// Either eye reports a blink
    pub fn is_blink(&self) -> bool {
        self.category_left == EyeCategory::Blink || self.category_right == EyeCategory::Blink
    }

    /// Either eye reports a saccade
    pub fn is_saccade(&self) -> bool {
        self.category_left == EyeCategory::Saccade || self.category_right == EyeCategory::Saccade
    }

    /// Either eye reports a fixation
    pub fn is_fixation(&self) -> bool {
        self.category_left == EyeCategory::Fixation || self.category_right == EyeCategory::Fixation
    }

    /// Both eyes carry the separator marker between trials
    pub fn is_separator(&self) -> bool {
        self.category_left == EyeCategory::Separator
            && self.category_right == EyeCategory::Separator
    }

    /// At least one of the four gaze coordinates is non-zero
    pub fn has_gaze_signal(&self) -> bool {
        self.right.has_signal() || self.left.has_signal()
    }

    /// Normalized timestamp, falling back to the exported one
    pub fn timeline_ms(&self) -> f64 {
        self.normalized_time_ms.unwrap_or(self.recording_time_ms)
    }

    pub fn overall_deviation(&self) -> f64 {
        self.deviation.map(|d| d.overall).unwrap_or(0.0)
    }
}

/// One grid point of a stimulus's group-average gaze path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    #[serde(rename = "SnappedTime")]
    pub snapped_time: i64,
    #[serde(rename = "Avg Right X")]
    pub avg_right_x: Option<f64>,
    #[serde(rename = "Avg Right Y")]
    pub avg_right_y: Option<f64>,
    #[serde(rename = "Avg Left X")]
    pub avg_left_x: Option<f64>,
    #[serde(rename = "Avg Left Y")]
    pub avg_left_y: Option<f64>,
}

impl ReferencePoint {
    pub fn right(&self) -> GazePoint {
        GazePoint {
            x: self.avg_right_x,
            y: self.avg_right_y,
        }
    }

    pub fn left(&self) -> GazePoint {
        GazePoint {
            x: self.avg_left_x,
            y: self.avg_left_y,
        }
    }
}

/// Group-average gaze path for one stimulus, keyed by snapped time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePath {
    pub stimulus: String,
    pub points: BTreeMap<i64, ReferencePoint>,
}

impl ReferencePath {
    pub fn new(stimulus: impl Into<String>) -> Self {
        Self {
            stimulus: stimulus.into(),
            points: BTreeMap::new(),
        }
    }

    pub fn point_at(&self, snapped_time: i64) -> Option<&ReferencePoint> {
        self.points.get(&snapped_time)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Reference paths of one run keyed by stimulus
pub type ReferencePaths = BTreeMap<String, ReferencePath>;

/// Statistics for one (participant, experiment, stimulus) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatisticsRow {
    #[serde(rename = "Participant")]
    pub participant: ParticipantId,
    #[serde(rename = "Experiment")]
    pub experiment: String,
    #[serde(rename = "Stimulus")]
    pub stimulus: String,
    /// Saccades / (saccades + fixations), 0-1
    #[serde(rename = "Saccade_Frequency", default)]
    pub saccade_frequency: f64,
    /// Mean saccade-episode duration (ms)
    #[serde(rename = "Avg_Saccade_Duration", default)]
    pub avg_saccade_duration: f64,
    #[serde(rename = "Avg_Gaze_Deviation", default)]
    pub avg_gaze_deviation: Option<f64>,
    #[serde(rename = "Avg_Fixation_Deviation", default)]
    pub avg_fixation_deviation: Option<f64>,
    #[serde(rename = "Avg_Saccade_Deviation", default)]
    pub avg_saccade_deviation: Option<f64>,
}

impl ExperimentStatisticsRow {
    pub fn new(
        participant: ParticipantId,
        experiment: impl Into<String>,
        stimulus: impl Into<String>,
    ) -> Self {
        Self {
            participant,
            experiment: experiment.into(),
            stimulus: stimulus.into(),
            saccade_frequency: 0.0,
            avg_saccade_duration: 0.0,
            avg_gaze_deviation: None,
            avg_fixation_deviation: None,
            avg_saccade_deviation: None,
        }
    }

    /// Whether `sample` belongs to this combination
    pub fn matches(&self, sample: &Sample) -> bool {
        sample.participant == self.participant
            && sample.experiment == self.experiment
            && sample.stimulus == self.stimulus
    }
}

/// Participant-level averages over all experiment statistics rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    #[serde(rename = "Participant")]
    pub participant: ParticipantId,
    #[serde(rename = "Saccade_Frequency")]
    pub saccade_frequency: Option<f64>,
    #[serde(rename = "Avg_Saccade_Duration")]
    pub avg_saccade_duration: Option<f64>,
    #[serde(rename = "Avg_Gaze_Deviation")]
    pub avg_gaze_deviation: Option<f64>,
    #[serde(rename = "Avg_Fixation_Deviation")]
    pub avg_fixation_deviation: Option<f64>,
    #[serde(rename = "Avg_Saccade_Deviation")]
    pub avg_saccade_deviation: Option<f64>,
    /// Number of (experiment, stimulus) segments contributing
    #[serde(rename = "Segments")]
    pub segments: usize,
}

/// The five metrics compared between groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "Avg_Gaze_Deviation")]
    AvgGazeDeviation,
    #[serde(rename = "Avg_Fixation_Deviation")]
    AvgFixationDeviation,
    #[serde(rename = "Avg_Saccade_Deviation")]
    AvgSaccadeDeviation,
    #[serde(rename = "Saccade_Frequency")]
    SaccadeFrequency,
    #[serde(rename = "Avg_Saccade_Duration")]
    AvgSaccadeDuration,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::AvgGazeDeviation,
        Metric::AvgFixationDeviation,
        Metric::AvgSaccadeDeviation,
        Metric::SaccadeFrequency,
        Metric::AvgSaccadeDuration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::AvgGazeDeviation => "Avg_Gaze_Deviation",
            Metric::AvgFixationDeviation => "Avg_Fixation_Deviation",
            Metric::AvgSaccadeDeviation => "Avg_Saccade_Deviation",
            Metric::SaccadeFrequency => "Saccade_Frequency",
            Metric::AvgSaccadeDuration => "Avg_Saccade_Duration",
        }
    }

    /// Read this metric from a participant summary
    pub fn value_of(&self, summary: &ParticipantSummary) -> Option<f64> {
        match self {
            Metric::AvgGazeDeviation => summary.avg_gaze_deviation,
            Metric::AvgFixationDeviation => summary.avg_fixation_deviation,
            Metric::AvgSaccadeDeviation => summary.avg_saccade_deviation,
            Metric::SaccadeFrequency => summary.saccade_frequency,
            Metric::AvgSaccadeDuration => summary.avg_saccade_duration,
        }
    }
}
