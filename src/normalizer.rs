//! Time normalization
//!
//! This module rebases raw tracker timestamps so runs can be compared:
//! - Normalized time starts at 0 per (participant, experiment)
//! - Stimulus time starts at 0 per (participant, experiment, stimulus)
//! - Duration is the gap to the next sample of the same experiment run

use crate::types::{ParticipantId, Sample};
use std::collections::HashMap;

type RunKey = (ParticipantId, String);
type SegmentKey = (ParticipantId, String, String);

/// Normalizer for the timing fields of a sample set
pub struct TimeNormalizer;

impl TimeNormalizer {
    /// Fill `normalized_time_ms`, `stimulus_time_ms` and `duration_ms` in place.
    ///
    /// Rows are never dropped or reordered.
    pub fn normalize(samples: &mut [Sample]) {
        normalize_run_time(samples);
        normalize_stimulus_time(samples);
        compute_durations(samples);
    }
}

fn run_key(sample: &Sample) -> RunKey {
    (sample.participant, sample.experiment.clone())
}

fn segment_key(sample: &Sample) -> SegmentKey {
    (
        sample.participant,
        sample.experiment.clone(),
        sample.stimulus.clone(),
    )
}

/// Subtract the run's earliest raw timestamp
fn normalize_run_time(samples: &mut [Sample]) {
    let mut minimums: HashMap<RunKey, f64> = HashMap::new();
    for sample in samples.iter() {
        minimums
            .entry(run_key(sample))
            .and_modify(|min| *min = min.min(sample.recording_time_ms))
            .or_insert(sample.recording_time_ms);
    }

    for sample in samples.iter_mut() {
        let min = minimums[&run_key(sample)];
        sample.normalized_time_ms = Some(sample.recording_time_ms - min);
    }
}

/// Subtract the segment's earliest normalized timestamp
fn normalize_stimulus_time(samples: &mut [Sample]) {
    let mut minimums: HashMap<SegmentKey, f64> = HashMap::new();
    for sample in samples.iter() {
        let time = sample.timeline_ms();
        minimums
            .entry(segment_key(sample))
            .and_modify(|min| *min = min.min(time))
            .or_insert(time);
    }

    for sample in samples.iter_mut() {
        let min = minimums[&segment_key(sample)];
        sample.stimulus_time_ms = Some(sample.timeline_ms() - min);
    }
}

/// Gap to the successor in timeline order; the last sample of a run gets 0
fn compute_durations(samples: &mut [Sample]) {
    let mut runs: HashMap<RunKey, Vec<usize>> = HashMap::new();
    for (idx, sample) in samples.iter().enumerate() {
        runs.entry(run_key(sample)).or_default().push(idx);
    }

    for mut indices in runs.into_values() {
        // Stable sort keeps export order for equal timestamps
        indices.sort_by(|&a, &b| samples[a].timeline_ms().total_cmp(&samples[b].timeline_ms()));

        for pair in indices.windows(2) {
            let gap = samples[pair[1]].timeline_ms() - samples[pair[0]].timeline_ms();
            samples[pair[0]].duration_ms = Some(gap);
        }
        if let Some(&last) = indices.last() {
            samples[last].duration_ms = Some(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EyeCategory, GazePoint};

    fn sample(participant: ParticipantId, experiment: &str, stimulus: &str, t: f64) -> Sample {
        Sample::new(
            participant,
            experiment,
            stimulus,
            EyeCategory::Fixation,
            EyeCategory::Fixation,
            GazePoint::new(100.0, 100.0),
            GazePoint::new(100.0, 100.0),
            t,
        )
    }

    #[test]
    fn test_run_time_starts_at_zero() {
        let mut samples = vec![
            sample(1, "1", "A", 1000.0),
            sample(1, "1", "A", 1016.0),
            sample(1, "2", "A", 5000.0),
            sample(1, "2", "B", 5040.0),
            sample(2, "1", "A", 300.0),
        ];
        TimeNormalizer::normalize(&mut samples);

        let times: Vec<f64> = samples.iter().map(|s| s.normalized_time_ms.unwrap()).collect();
        assert_eq!(times, vec![0.0, 16.0, 0.0, 40.0, 0.0]);
    }

    #[test]
    fn test_stimulus_time_per_segment() {
        let mut samples = vec![
            sample(1, "1", "A", 0.0),
            sample(1, "1", "A", 20.0),
            sample(1, "1", "B", 40.0),
            sample(1, "1", "B", 65.0),
        ];
        TimeNormalizer::normalize(&mut samples);

        let times: Vec<f64> = samples.iter().map(|s| s.stimulus_time_ms.unwrap()).collect();
        assert_eq!(times, vec![0.0, 20.0, 0.0, 25.0]);
    }

    #[test]
    fn test_durations_follow_timeline_order() {
        let mut samples = vec![
            sample(1, "1", "A", 30.0),
            sample(1, "1", "A", 0.0),
            sample(1, "1", "A", 10.0),
            sample(1, "2", "A", 100.0),
        ];
        TimeNormalizer::normalize(&mut samples);

        let durations: Vec<f64> = samples.iter().map(|s| s.duration_ms.unwrap()).collect();
        // 0 -> 10 -> 30, last of run gets 0; run "2" is a single sample
        assert_eq!(durations, vec![0.0, 10.0, 20.0, 0.0]);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut samples: Vec<Sample> = Vec::new();
        TimeNormalizer::normalize(&mut samples);
        assert!(samples.is_empty());
    }
}
