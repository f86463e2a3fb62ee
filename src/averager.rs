//! Reference path averaging
//!
//! For every stimulus, the snapped samples of all participants that saw it are
//! averaged per grid label into one group-average ("reference") gaze path.
//! This is a fan-in step: it needs every participant's snapped samples first.

use crate::types::{
    ExperimentStatisticsRow, ParticipantId, ParticipantSnapshot, ReferencePath, ReferencePaths,
    ReferencePoint, Sample,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Running arithmetic mean that ignores missing values
#[derive(Debug, Clone, Copy, Default)]
struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[derive(Debug, Default)]
struct PointAccumulator {
    right_x: MeanAccumulator,
    right_y: MeanAccumulator,
    left_x: MeanAccumulator,
    left_y: MeanAccumulator,
}

impl PointAccumulator {
    fn add(&mut self, sample: &Sample) {
        self.right_x.add(sample.right.x);
        self.right_y.add(sample.right.y);
        self.left_x.add(sample.left.x);
        self.left_y.add(sample.left.y);
    }

    fn finish(&self, snapped_time: i64) -> ReferencePoint {
        ReferencePoint {
            snapped_time,
            avg_right_x: self.right_x.mean(),
            avg_right_y: self.right_y.mean(),
            avg_left_x: self.left_x.mean(),
            avg_left_y: self.left_y.mean(),
        }
    }
}

/// A sample may shape the reference path only if it is not a blink and
/// carries at least one non-zero gaze coordinate.
pub fn is_path_eligible(sample: &Sample) -> bool {
    !sample.is_blink() && sample.has_gaze_signal()
}

/// Builder of per-stimulus reference paths
pub struct PathAverager;

impl PathAverager {
    /// Average the given samples of one stimulus per snapped label.
    ///
    /// Returns `None` when no eligible snapped sample remains.
    pub fn average_stimulus<'a, I>(stimulus: &str, samples: I) -> Option<ReferencePath>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut by_label: BTreeMap<i64, PointAccumulator> = BTreeMap::new();

        for sample in samples {
            if sample.stimulus != stimulus || !is_path_eligible(sample) {
                continue;
            }
            if let Some(label) = sample.snapped_time {
                by_label.entry(label).or_default().add(sample);
            }
        }

        if by_label.is_empty() {
            return None;
        }

        let mut path = ReferencePath::new(stimulus);
        for (label, accumulator) in by_label {
            path.points.insert(label, accumulator.finish(label));
        }
        Some(path)
    }

    /// Compute a reference path for every stimulus named by `combinations`.
    ///
    /// Each combination contributes the samples of its (participant, experiment)
    /// for that stimulus. Participants absent from the snapshot are skipped, and
    /// stimuli without any eligible sample get no path.
    pub fn compute(
        snapshot: &ParticipantSnapshot,
        combinations: &[ExperimentStatisticsRow],
    ) -> ReferencePaths {
        let mut runs_by_stimulus: BTreeMap<&str, BTreeSet<(ParticipantId, &str)>> =
            BTreeMap::new();
        for row in combinations {
            runs_by_stimulus
                .entry(row.stimulus.as_str())
                .or_default()
                .insert((row.participant, row.experiment.as_str()));
        }

        let mut paths = ReferencePaths::new();
        for (stimulus, runs) in runs_by_stimulus {
            let contributing = runs.iter().flat_map(|&(participant, experiment)| {
                let samples: &[Sample] = match snapshot.get(&participant) {
                    Some(samples) => samples.as_slice(),
                    None => {
                        debug!(participant, stimulus, "participant not loaded; skipping");
                        &[]
                    }
                };
                samples
                    .iter()
                    .filter(move |sample| sample.experiment == experiment)
            });

            match Self::average_stimulus(stimulus, contributing) {
                Some(path) => {
                    debug!(stimulus, points = path.len(), "reference path computed");
                    paths.insert(stimulus.to_string(), path);
                }
                None => warn!(stimulus, "no eligible samples; reference path skipped"),
            }
        }

        info!(stimuli = paths.len(), "reference paths complete");
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EyeCategory, GazePoint};
    use pretty_assertions::assert_eq;

    fn snapped_sample(
        participant: ParticipantId,
        label: i64,
        right: GazePoint,
        left: GazePoint,
    ) -> Sample {
        let mut sample = Sample::new(
            participant,
            "1",
            "StimA",
            EyeCategory::Fixation,
            EyeCategory::Fixation,
            right,
            left,
            label as f64,
        );
        sample.snapped_time = Some(label);
        sample
    }

    #[test]
    fn test_identical_participants_give_exact_point() {
        let mut snapshot = ParticipantSnapshot::new();
        for participant in [1, 2] {
            snapshot.insert(
                participant,
                vec![snapped_sample(
                    participant,
                    20,
                    GazePoint::new(100.0, 200.0),
                    GazePoint::new(110.0, 210.0),
                )],
            );
        }
        let combos = vec![
            ExperimentStatisticsRow::new(1, "1", "StimA"),
            ExperimentStatisticsRow::new(2, "1", "StimA"),
        ];

        let paths = PathAverager::compute(&snapshot, &combos);
        let point = paths["StimA"].point_at(20).unwrap();
        assert_eq!(point.right(), GazePoint::new(100.0, 200.0));
        assert_eq!(point.left(), GazePoint::new(110.0, 210.0));
    }

    #[test]
    fn test_mean_across_participants() {
        let samples = vec![
            snapped_sample(1, 0, GazePoint::new(100.0, 100.0), GazePoint::new(0.0, 0.0)),
            snapped_sample(2, 0, GazePoint::new(200.0, 300.0), GazePoint::new(50.0, 50.0)),
        ];
        let path = PathAverager::average_stimulus("StimA", &samples).unwrap();
        let point = path.point_at(0).unwrap();
        assert_eq!(point.avg_right_x, Some(150.0));
        assert_eq!(point.avg_right_y, Some(200.0));
        // Zero-valued left coordinates are still real readings for the mean
        assert_eq!(point.avg_left_x, Some(25.0));
    }

    #[test]
    fn test_blinks_and_empty_rows_excluded() {
        let mut blink = snapped_sample(1, 0, GazePoint::new(900.0, 900.0), GazePoint::new(900.0, 900.0));
        blink.category_right = EyeCategory::parse("blink");
        let empty = snapped_sample(2, 0, GazePoint::new(0.0, 0.0), GazePoint::new(0.0, 0.0));
        let valid = snapped_sample(3, 0, GazePoint::new(10.0, 20.0), GazePoint::new(30.0, 40.0));

        let samples = vec![blink, empty, valid];
        let path = PathAverager::average_stimulus("StimA", &samples).unwrap();
        let point = path.point_at(0).unwrap();
        assert_eq!(point.right(), GazePoint::new(10.0, 20.0));
        assert_eq!(point.left(), GazePoint::new(30.0, 40.0));
    }

    #[test]
    fn test_missing_coordinates_ignored_in_mean() {
        let samples = vec![
            snapped_sample(1, 40, GazePoint { x: None, y: Some(10.0) }, GazePoint::new(1.0, 1.0)),
            snapped_sample(2, 40, GazePoint::new(8.0, 30.0), GazePoint::new(3.0, 3.0)),
        ];
        let path = PathAverager::average_stimulus("StimA", &samples).unwrap();
        let point = path.point_at(40).unwrap();
        assert_eq!(point.avg_right_x, Some(8.0));
        assert_eq!(point.avg_right_y, Some(20.0));
    }

    #[test]
    fn test_unsnapped_samples_do_not_contribute() {
        let mut sample = snapped_sample(1, 0, GazePoint::new(5.0, 5.0), GazePoint::new(5.0, 5.0));
        sample.snapped_time = None;
        assert!(PathAverager::average_stimulus("StimA", &[sample]).is_none());
    }

    #[test]
    fn test_stimulus_without_data_skipped() {
        let snapshot = ParticipantSnapshot::new();
        let combos = vec![ExperimentStatisticsRow::new(7, "1", "StimZ")];
        let paths = PathAverager::compute(&snapshot, &combos);
        assert!(paths.is_empty());
    }

    #[test]
    fn test_only_listed_experiments_contribute() {
        let mut other_run = snapped_sample(1, 0, GazePoint::new(500.0, 500.0), GazePoint::new(500.0, 500.0));
        other_run.experiment = "2".to_string();
        let listed = snapped_sample(1, 0, GazePoint::new(10.0, 10.0), GazePoint::new(10.0, 10.0));

        let mut snapshot = ParticipantSnapshot::new();
        snapshot.insert(1, vec![other_run, listed]);
        let combos = vec![ExperimentStatisticsRow::new(1, "1", "StimA")];

        let paths = PathAverager::compute(&snapshot, &combos);
        assert_eq!(paths["StimA"].point_at(0).unwrap().avg_right_x, Some(10.0));
    }
}
