//! Gaze deviation
//!
//! Measures how far each snapped sample lies from its stimulus's reference path
//! at the same grid label, per eye and combined.

use crate::averager::is_path_eligible;
use crate::types::{GazeDeviation, GazePoint, ReferencePaths, ReferencePoint, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Counts of what happened to each sample during one deviation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviationOutcome {
    /// Deviation computed
    pub resolved: usize,
    /// Matched a reference point but was a blink or had no gaze signal
    pub no_signal: usize,
    /// Not a grid representative
    pub unsnapped: usize,
    /// Snapped, but no reference path or no point at its label
    pub unresolved: usize,
    /// Stimuli seen without any reference path
    pub missing_paths: BTreeSet<String>,
}

impl DeviationOutcome {
    /// Add the counts of another pass, e.g. of the next participant
    pub fn merge(&mut self, other: DeviationOutcome) {
        self.resolved += other.resolved;
        self.no_signal += other.no_signal;
        self.unsnapped += other.unsnapped;
        self.unresolved += other.unresolved;
        self.missing_paths.extend(other.missing_paths);
    }
}

/// Calculator for per-sample gaze deviation
pub struct DeviationCalculator;

impl DeviationCalculator {
    /// Overwrite the deviation of every sample in place.
    ///
    /// Samples whose reference cannot be resolved keep `deviation = None`; this
    /// is never an error.
    pub fn apply(samples: &mut [Sample], paths: &ReferencePaths) -> DeviationOutcome {
        let mut outcome = DeviationOutcome::default();

        for sample in samples.iter_mut() {
            sample.deviation = None;

            let path = match paths.get(&sample.stimulus) {
                Some(path) => path,
                None => {
                    if outcome.missing_paths.insert(sample.stimulus.clone()) {
                        warn!(
                            stimulus = sample.stimulus.as_str(),
                            "no reference path for stimulus; deviations left unset"
                        );
                    }
                    if sample.snapped_time.is_some() {
                        outcome.unresolved += 1;
                    } else {
                        outcome.unsnapped += 1;
                    }
                    continue;
                }
            };

            let label = match sample.snapped_time {
                Some(label) => label,
                None => {
                    outcome.unsnapped += 1;
                    continue;
                }
            };

            let point = match path.point_at(label) {
                Some(point) => point,
                None => {
                    debug!(
                        participant = sample.participant,
                        stimulus = sample.stimulus.as_str(),
                        label,
                        "snapped time missing from reference path"
                    );
                    outcome.unresolved += 1;
                    continue;
                }
            };

            match Self::deviation_for(sample, point) {
                Some(deviation) => {
                    sample.deviation = Some(deviation);
                    outcome.resolved += 1;
                }
                None => outcome.no_signal += 1,
            }
        }

        outcome
    }

    /// Deviation of `sample` from `point`, `None` for blinks and all-zero samples
    pub fn deviation_for(sample: &Sample, point: &ReferencePoint) -> Option<GazeDeviation> {
        if !is_path_eligible(sample) {
            return None;
        }

        let right = eye_distance(&sample.right, &point.right());
        let left = eye_distance(&sample.left, &point.left());

        Some(GazeDeviation {
            right,
            left,
            overall: combine(right, left),
        })
    }
}

/// Distance of one eye from the reference.
///
/// 0 when the sample has no usable reading for this eye (missing or `(0, 0)`)
/// or the reference point has no value for it.
fn eye_distance(observed: &GazePoint, reference: &GazePoint) -> f64 {
    if observed.is_zero() {
        return 0.0;
    }
    observed.distance_to(reference).unwrap_or(0.0)
}

/// Mean of both eyes when both are non-zero, otherwise whichever one is
fn combine(right: f64, left: f64) -> f64 {
    match (right > 0.0, left > 0.0) {
        (true, true) => (right + left) / 2.0,
        (true, false) => right,
        (false, true) => left,
        (false, false) => 0.0,
    }
}
