//! Row sanitizing
//!
//! Runs before the timing stages:
//! - Required-column checks for incoming record sets
//! - Separator rows between trials removed
//! - Empty gaze cells filled with the "no signal" value, unreadable cells marked missing
//! - Empty or non-finite timestamps filled with 0

use crate::error::GazeError;
use crate::types::{ParticipantId, Sample};
use tracing::warn;

pub const COL_PARTICIPANT: &str = "Participant";
pub const COL_EXPERIMENT: &str = "Experiment";
pub const COL_STIMULUS: &str = "Stimulus";
pub const COL_CATEGORY_LEFT: &str = "Category Left";
pub const COL_CATEGORY_RIGHT: &str = "Category Right";
pub const COL_RIGHT_X: &str = "Point of Regard Right X [px]";
pub const COL_RIGHT_Y: &str = "Point of Regard Right Y [px]";
pub const COL_LEFT_X: &str = "Point of Regard Left X [px]";
pub const COL_LEFT_Y: &str = "Point of Regard Left Y [px]";
pub const COL_RECORDING_TIME: &str = "RecordingTime [ms]";

/// Columns every raw per-experiment export must carry
pub const RAW_EXPORT_COLUMNS: [&str; 9] = [
    COL_RECORDING_TIME,
    COL_PARTICIPANT,
    COL_STIMULUS,
    COL_CATEGORY_RIGHT,
    COL_CATEGORY_LEFT,
    COL_RIGHT_X,
    COL_RIGHT_Y,
    COL_LEFT_X,
    COL_LEFT_Y,
];

/// Columns every participant record set must carry
pub const PARTICIPANT_COLUMNS: [&str; 10] = [
    COL_PARTICIPANT,
    COL_EXPERIMENT,
    COL_STIMULUS,
    COL_CATEGORY_LEFT,
    COL_CATEGORY_RIGHT,
    COL_RIGHT_X,
    COL_RIGHT_Y,
    COL_LEFT_X,
    COL_LEFT_Y,
    COL_RECORDING_TIME,
];

/// Row sanitizer applied to every record set before normalization
pub struct RowSanitizer;

impl RowSanitizer {
    /// Fail with `MissingSchema` if any of `required` is absent from `headers`.
    ///
    /// Header names are compared after trimming surrounding whitespace.
    pub fn check_columns<'a, I>(
        headers: I,
        required: &[&str],
        record_set: &str,
    ) -> Result<(), GazeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|column| !present.contains(column))
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GazeError::MissingSchema {
                record_set: record_set.to_string(),
                columns: missing,
            })
        }
    }

    /// Remove rows where both eyes carry the separator marker
    pub fn drop_separators(samples: Vec<Sample>) -> Vec<Sample> {
        samples
            .into_iter()
            .filter(|sample| !sample.is_separator())
            .collect()
    }

    /// Read one gaze coordinate cell.
    ///
    /// Empty cells become `0.0` ("no signal"); cells that are not finite numbers
    /// become `None` so they never count as a real zero.
    pub fn coordinate(cell: Option<&str>) -> Option<f64> {
        let raw = match cell.map(str::trim) {
            None | Some("") => return Some(0.0),
            Some(raw) => raw,
        };
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                if !raw.eq_ignore_ascii_case("nan") {
                    warn!(value = raw, "non-numeric gaze coordinate treated as missing");
                }
                None
            }
        }
    }

    /// Read a timestamp cell; empty and non-finite cells are filled with 0
    pub fn timestamp(cell: Option<&str>) -> f64 {
        let raw = cell.map(str::trim).unwrap_or("");
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                if !raw.is_empty() && !raw.eq_ignore_ascii_case("nan") {
                    warn!(value = raw, "non-numeric timestamp filled with 0");
                }
                0.0
            }
        }
    }

    /// Read a participant cell. Integral floats (`101.0`) are accepted; anything
    /// else is `None` and the row cannot be placed.
    pub fn participant(cell: Option<&str>) -> Option<ParticipantId> {
        let raw = cell.map(str::trim).unwrap_or("");
        if let Ok(id) = raw.parse::<ParticipantId>() {
            return Some(id);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value.fract() == 0.0 => Some(value as ParticipantId),
            _ => None,
        }
    }
}
