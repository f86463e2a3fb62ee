//! Pipeline orchestration
//!
//! This module provides the public API for gazepath.
//! It runs the full pipeline from stored participant record sets to reference
//! paths, per-sample deviations and summary statistics.

use crate::aggregator::SegmentAggregator;
use crate::averager::PathAverager;
use crate::config::PipelineConfig;
use crate::deviation::{DeviationCalculator, DeviationOutcome};
use crate::error::GazeError;
use crate::normalizer::TimeNormalizer;
use crate::sanitize::RowSanitizer;
use crate::snapper::TimeSnapper;
use crate::stats::{GroupComparison, MetricComparison};
use crate::store::{RecordStore, SkippedRecordSet};
use crate::types::{ExperimentStatisticsRow, ParticipantSnapshot, ReferencePaths, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Normalize the timing fields of `samples` and assign snapped-time labels.
///
/// Samples may belong to any number of participants, experiments and stimuli.
/// Run time and durations are computed per (participant, experiment), so two
/// participants sharing an experiment ID never interleave.
pub fn normalize_and_snap(mut samples: Vec<Sample>, config: &PipelineConfig) -> Vec<Sample> {
    TimeNormalizer::normalize(&mut samples);
    TimeSnapper::new(config.grid_interval_ms).snap(&mut samples);
    samples
}

/// Compute one reference path per stimulus named by `combinations`.
///
/// Every participant in `snapshot` must already be normalized and snapped.
pub fn compute_reference_paths(
    snapshot: &ParticipantSnapshot,
    combinations: &[ExperimentStatisticsRow],
) -> ReferencePaths {
    PathAverager::compute(snapshot, combinations)
}

/// Set the deviation of every sample from its stimulus's reference path.
///
/// Samples without a resolvable reference point keep `deviation = None`.
pub fn compute_deviations(mut samples: Vec<Sample>, paths: &ReferencePaths) -> Vec<Sample> {
    let outcome = DeviationCalculator::apply(&mut samples, paths);
    if outcome.unresolved > 0 {
        warn!(
            unresolved = outcome.unresolved,
            "samples without a reference point"
        );
    }
    samples
}

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Participants whose record sets went through every stage
    pub participants_processed: usize,
    pub samples_processed: usize,
    /// Record sets left out, with the reason
    pub skipped: Vec<SkippedRecordSet>,
    /// Stimuli that produced a reference path
    pub reference_paths: BTreeSet<String>,
    /// Stimuli seen in the data without any reference path
    pub stimuli_without_reference: BTreeSet<String>,
    /// Snapped samples whose reference path or grid point was missing
    pub unresolved_samples: usize,
    pub deviations: DeviationOutcome,
    /// Empty when no participant metadata is stored
    pub comparisons: Vec<MetricComparison>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, GazeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Processor for complete runs over a record store.
///
/// Stages:
/// 1. RecordStore - Load every participant into one snapshot
/// 2. RowSanitizer - Drop separator rows
/// 3. TimeNormalizer / TimeSnapper - Rebase timestamps and snap to the grid
/// 4. PathAverager - Reference path per stimulus over all participants
/// 5. DeviationCalculator - Per-sample deviation from the reference path
/// 6. SegmentAggregator - Experiment statistics and participant averages
/// 7. GroupComparison - Clinical vs typical group, when metadata is stored
pub struct GazeProcessor {
    config: PipelineConfig,
}

impl Default for GazeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl GazeProcessor {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Create a processor with a specific configuration
    pub fn with_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Load the configuration from JSON
    pub fn load_config(&mut self, json: &str) -> Result<(), GazeError> {
        self.config = PipelineConfig::from_json(json)?;
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over the record sets in `store` and persist the results.
    ///
    /// Record sets failing with a local error are skipped and listed in the
    /// report; storage failures while persisting abort the run.
    pub fn run<S: RecordStore>(&self, store: &mut S) -> Result<RunReport, GazeError> {
        self.config.validate()?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "gaze pipeline started");

        let (snapshot, skipped) = store.load_snapshot()?;
        info!(
            participants = snapshot.len(),
            skipped = skipped.len(),
            "participant record sets loaded"
        );

        let mut snapshot: ParticipantSnapshot = snapshot
            .into_iter()
            .map(|(participant, samples)| {
                let samples = RowSanitizer::drop_separators(samples);
                (participant, normalize_and_snap(samples, &self.config))
            })
            .collect();
        info!("timestamps normalized and snapped");

        let mut rows = SegmentAggregator::combinations(&snapshot);
        let paths = compute_reference_paths(&snapshot, &rows);

        let mut deviations = DeviationOutcome::default();
        for samples in snapshot.values_mut() {
            deviations.merge(DeviationCalculator::apply(samples, &paths));
        }
        info!(
            resolved = deviations.resolved,
            unresolved = deviations.unresolved,
            "deviations computed"
        );

        SegmentAggregator::aggregate_all(&mut rows, &snapshot);
        let summaries = SegmentAggregator::participant_summaries(&rows);
        info!(
            segments = rows.len(),
            participants = summaries.len(),
            "statistics aggregated"
        );

        let classes = store.load_participant_classes()?;
        let comparisons = if classes.is_empty() {
            Vec::new()
        } else {
            GroupComparison::compare(&summaries, &classes, &self.config)
        };

        for (participant, samples) in &snapshot {
            store.save_participant(*participant, samples)?;
        }
        for path in paths.values() {
            store.save_reference_path(path)?;
        }
        store.save_experiment_statistics(&rows)?;
        store.save_participant_summaries(&summaries)?;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            participants_processed: snapshot.len(),
            samples_processed: snapshot.values().map(Vec::len).sum(),
            skipped,
            reference_paths: paths.keys().cloned().collect(),
            stimuli_without_reference: deviations.missing_paths.clone(),
            unresolved_samples: deviations.unresolved,
            deviations,
            comparisons,
        };
        info!(%run_id, "gaze pipeline finished");
        Ok(report)
    }
    /// Recompute deviations of the stored participants against the stored
    /// reference paths, without rebuilding the paths.
    ///
    /// Participants must already be normalized and snapped, e.g. by an earlier
    /// `run`. Unreadable record sets and reference paths are skipped.
    pub fn recompute_deviations<S: RecordStore>(
        &self,
        store: &mut S,
    ) -> Result<DeviationOutcome, GazeError> {
        let (mut snapshot, skipped) = store.load_snapshot()?;

        let stimuli: BTreeSet<&str> = snapshot
            .values()
            .flatten()
            .map(|sample| sample.stimulus.as_str())
            .collect();
        let mut paths = ReferencePaths::new();
        for stimulus in stimuli {
            match store.load_reference_path(stimulus) {
                Ok(Some(path)) => {
                    paths.insert(stimulus.to_string(), path);
                }
                Ok(None) => {}
                Err(e) if e.is_local() => {
                    warn!(stimulus, error = %e, "skipping stored reference path");
                }
                Err(e) => return Err(e),
            }
        }

        let mut deviations = DeviationOutcome::default();
        for (participant, samples) in snapshot.iter_mut() {
            deviations.merge(DeviationCalculator::apply(samples, &paths));
            store.save_participant(*participant, samples)?;
        }
        info!(
            participants = snapshot.len(),
            skipped = skipped.len(),
            resolved = deviations.resolved,
            unresolved = deviations.unresolved,
            "deviations recomputed from stored reference paths"
        );
        Ok(deviations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ParticipantClass;
    use crate::store::{CsvRecordStore, MemoryRecordStore};
    use crate::types::{EyeCategory, GazeDeviation, GazePoint, ParticipantId};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn fixation(participant: ParticipantId, time: f64, x: f64) -> Sample {
        Sample::new(
            participant,
            "1",
            "StimA",
            EyeCategory::Fixation,
            EyeCategory::Fixation,
            GazePoint::new(x, 100.0),
            GazePoint::new(x, 100.0),
            time,
        )
    }

    fn two_participants() -> Vec<Sample> {
        let mut samples = Vec::new();
        for time in [1000.0, 1020.0, 1040.0] {
            samples.push(fixation(1, time, 100.0));
            samples.push(fixation(2, time + 500.0, 110.0));
        }
        samples
    }

    #[test]
    fn test_normalize_and_snap() {
        let samples = vec![
            fixation(1, 109.0, 1.0),
            fixation(1, 131.0, 1.0),
            fixation(1, 100.0, 1.0),
        ];
        let samples = normalize_and_snap(samples, &PipelineConfig::default());

        let labels: Vec<Option<i64>> = samples.iter().map(|s| s.snapped_time).collect();
        // 9 ms loses label 0 to the sample at 0 ms; 31 ms rounds up to 40
        assert_eq!(labels, vec![None, Some(40), Some(0)]);
        assert_eq!(samples[0].normalized_time_ms, Some(9.0));
    }

    #[test]
    fn test_normalize_and_snap_keeps_participants_apart() {
        // Same experiment ID, interleaved timestamps
        let samples = vec![
            fixation(1, 0.0, 1.0),
            fixation(2, 5.0, 1.0),
            fixation(1, 20.0, 1.0),
            fixation(2, 45.0, 1.0),
        ];
        let samples = normalize_and_snap(samples, &PipelineConfig::default());

        let durations: Vec<Option<f64>> = samples.iter().map(|s| s.duration_ms).collect();
        assert_eq!(durations, vec![Some(20.0), Some(40.0), Some(0.0), Some(0.0)]);
        assert_eq!(samples[1].normalized_time_ms, Some(0.0));
    }

    #[test]
    fn test_compute_deviations_without_paths() {
        let samples = normalize_and_snap(vec![fixation(1, 0.0, 5.0)], &PipelineConfig::default());
        let samples = compute_deviations(samples, &ReferencePaths::new());
        assert_eq!(samples[0].deviation, None);
    }

    #[test]
    fn test_identical_participants_have_zero_deviation() {
        let mut snapshot = ParticipantSnapshot::new();
        for participant in [1, 2] {
            let samples = vec![fixation(participant, 0.0, 50.0), fixation(participant, 20.0, 60.0)];
            snapshot.insert(participant, normalize_and_snap(samples, &PipelineConfig::default()));
        }

        let rows = SegmentAggregator::combinations(&snapshot);
        let paths = compute_reference_paths(&snapshot, &rows);
        let point = paths["StimA"].point_at(20).unwrap();
        assert_eq!(point.avg_right_x, Some(60.0));

        let samples = compute_deviations(snapshot[&1].clone(), &paths);
        assert!(samples
            .iter()
            .all(|s| s.deviation == Some(GazeDeviation::default())));
    }

    #[test]
    fn test_run_over_memory_store() {
        let classes = vec![
            ParticipantClass {
                participant: 1,
                class: "ASD".to_string(),
            },
            ParticipantClass {
                participant: 2,
                class: "TD".to_string(),
            },
        ];
        let mut store =
            MemoryRecordStore::from_samples(two_participants()).with_participant_classes(classes);

        let report = GazeProcessor::new().run(&mut store).unwrap();

        assert_eq!(report.participants_processed, 2);
        assert_eq!(report.samples_processed, 6);
        assert!(report.skipped.is_empty());
        assert_eq!(report.deviations.resolved, 6);
        assert_eq!(report.unresolved_samples, 0);
        assert_eq!(report.comparisons.len(), 5);
        // One participant per group: no test possible
        assert!(report.comparisons.iter().all(|c| c.test.is_none()));

        // Reference x is the mean of 100 and 110 on both eyes
        let path = &store.reference_paths()["StimA"];
        assert_eq!(path.len(), 3);
        assert_eq!(path.point_at(40).unwrap().avg_left_x, Some(105.0));

        let rows = store.experiment_statistics();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.avg_gaze_deviation == Some(5.0)));
        assert!(rows.iter().all(|r| r.saccade_frequency == 0.0));

        let stored = &store.participants()[&2];
        assert_eq!(stored[0].normalized_time_ms, Some(0.0));
        assert_eq!(stored[0].duration_ms, Some(20.0));
        assert_eq!(stored[2].duration_ms, Some(0.0));

        let summaries = store.participant_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].avg_gaze_deviation, Some(5.0));
    }

    #[test]
    fn test_run_drops_separators_and_reports_missing_paths() {
        let mut samples = two_participants();
        samples.push(Sample::new(
            1,
            "1",
            "StimA",
            EyeCategory::Separator,
            EyeCategory::Separator,
            GazePoint::new(0.0, 0.0),
            GazePoint::new(0.0, 0.0),
            1060.0,
        ));
        // Only blinks: no eligible sample, so no reference path
        samples.push(Sample::new(
            2,
            "1",
            "StimB",
            EyeCategory::Blink,
            EyeCategory::Blink,
            GazePoint::new(0.0, 0.0),
            GazePoint::new(0.0, 0.0),
            3000.0,
        ));
        let mut store = MemoryRecordStore::from_samples(samples);

        let report = GazeProcessor::new().run(&mut store).unwrap();

        assert_eq!(store.participants()[&1].len(), 3);
        assert_eq!(
            report.reference_paths.into_iter().collect::<Vec<_>>(),
            vec!["StimA".to_string()]
        );
        assert!(report.stimuli_without_reference.contains("StimB"));
        assert_eq!(report.unresolved_samples, 1);
        assert!(report.comparisons.is_empty());

        let stim_b = store
            .experiment_statistics()
            .iter()
            .find(|r| r.stimulus == "StimB")
            .unwrap();
        assert_eq!(stim_b.avg_gaze_deviation, None);
    }

    #[test]
    fn test_recompute_deviations_uses_stored_paths() {
        let mut store = MemoryRecordStore::from_samples(two_participants());
        let processor = GazeProcessor::new();
        processor.run(&mut store).unwrap();

        // Shift the stored reference so every eye is 5 px further away
        let mut path = store.reference_paths()["StimA"].clone();
        for point in path.points.values_mut() {
            point.avg_right_x = point.avg_right_x.map(|x| x - 5.0);
            point.avg_left_x = point.avg_left_x.map(|x| x - 5.0);
        }
        store.save_reference_path(&path).unwrap();

        let outcome = processor.recompute_deviations(&mut store).unwrap();
        assert_eq!(outcome.resolved, 6);
        assert!(outcome.missing_paths.is_empty());

        // Participant 1 sits on the shifted reference, participant 2 is 10 px off
        let first = &store.participants()[&1];
        assert!(first.iter().all(|s| s.deviation == Some(GazeDeviation::default())));
        let second = &store.participants()[&2];
        assert!(second
            .iter()
            .all(|s| s.deviation.map(|d| d.overall) == Some(10.0)));
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let config = PipelineConfig {
            grid_interval_ms: 0.0,
            ..PipelineConfig::default()
        };
        let mut store = MemoryRecordStore::from_samples(two_participants());
        let err = GazeProcessor::with_config(config).run(&mut store).unwrap_err();
        assert!(matches!(err, GazeError::InvalidConfig(_)));
    }

    #[test]
    fn test_run_over_csv_store_skips_broken_participant() {
        let root = std::env::temp_dir().join(format!("gazepath-run-{}", uuid::Uuid::new_v4()));
        let mut store = CsvRecordStore::new(&root);
        for participant in [1, 2] {
            let samples: Vec<Sample> = two_participants()
                .into_iter()
                .filter(|s| s.participant == participant)
                .collect();
            store.save_participant(participant, &samples).unwrap();
        }
        fs::write(
            store.participant_file(3),
            "Participant,Experiment,Stimulus\n3,1,StimA\n",
        )
        .unwrap();

        let report = GazeProcessor::new().run(&mut store).unwrap();

        assert_eq!(report.participants_processed, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record_set, "Participant_3");
        assert!(store.reference_path_file("StimA").exists());
        assert!(store.experiment_statistics_file().exists());
        assert!(store.participant_averages_file().exists());

        let reloaded = store.load_participant(1).unwrap();
        assert!(reloaded.iter().all(|s| s.deviation.is_some()));
        assert!(report.to_json().unwrap().contains("Participant_3"));

        fs::remove_dir_all(&root).unwrap();
    }
}
