//! Snapped-time assignment
//!
//! Different participants are sampled at slightly different timestamps. Snapping
//! picks, per (participant, experiment, stimulus) segment, the single sample
//! closest to each grid point so recordings line up on a shared time axis.

use crate::config::DEFAULT_GRID_INTERVAL_MS;
use crate::types::{ParticipantId, Sample};
use std::collections::{BTreeMap, HashMap};

type SegmentKey = (ParticipantId, String, String);

/// Assigns grid labels to the samples of every segment
pub struct TimeSnapper {
    grid_interval_ms: f64,
}

impl Default for TimeSnapper {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_INTERVAL_MS)
    }
}

impl TimeSnapper {
    pub fn new(grid_interval_ms: f64) -> Self {
        Self { grid_interval_ms }
    }

    /// Nearest grid label for a stimulus-relative time.
    ///
    /// Halfway values round to the even multiple (10 ms → 0, 30 ms → 40 on a 20 ms grid).
    pub fn label_for(&self, time_ms: f64) -> i64 {
        let steps = (time_ms / self.grid_interval_ms).round_ties_even();
        (steps * self.grid_interval_ms).round() as i64
    }

    /// Set `snapped_time` in place; non-representative samples are cleared.
    ///
    /// Requires `stimulus_time_ms` from the normalizer. Samples without it fall
    /// back to their timeline timestamp.
    pub fn snap(&self, samples: &mut [Sample]) {
        let mut segments: HashMap<SegmentKey, Vec<usize>> = HashMap::new();
        for (idx, sample) in samples.iter().enumerate() {
            segments
                .entry((
                    sample.participant,
                    sample.experiment.clone(),
                    sample.stimulus.clone(),
                ))
                .or_default()
                .push(idx);
        }

        for sample in samples.iter_mut() {
            sample.snapped_time = None;
        }

        for indices in segments.values() {
            for (label, idx) in self.representatives(samples, indices) {
                samples[idx].snapped_time = Some(label);
            }
        }
    }

    /// Closest sample per label within one segment, earliest on exact ties.
    /// Samples without a finite time never represent a label.
    fn representatives(&self, samples: &[Sample], indices: &[usize]) -> BTreeMap<i64, usize> {
        let mut best: BTreeMap<i64, (usize, f64)> = BTreeMap::new();

        for &idx in indices {
            let time = samples[idx]
                .stimulus_time_ms
                .unwrap_or_else(|| samples[idx].timeline_ms());
            if !time.is_finite() {
                continue;
            }
            let label = self.label_for(time);
            let distance = (time - label as f64).abs();

            match best.get(&label) {
                Some(&(_, current)) if distance >= current => {}
                _ => {
                    best.insert(label, (idx, distance));
                }
            }
        }

        best.into_iter().map(|(label, (idx, _))| (label, idx)).collect()
    }
}
