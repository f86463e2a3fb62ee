//! Segment and participant aggregation
//!
//! Reduces per-sample results into one statistics row per
//! (participant, experiment, stimulus) segment, then into participant averages.
//! Zero deviations mean "not computed" and are left out of every mean.

use crate::types::{
    ExperimentStatisticsRow, ParticipantId, ParticipantSnapshot, ParticipantSummary, Sample,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Aggregator for experiment statistics rows
pub struct SegmentAggregator;

impl SegmentAggregator {
    /// Unique (participant, experiment, stimulus) combinations, sorted by stimulus
    pub fn combinations(snapshot: &ParticipantSnapshot) -> Vec<ExperimentStatisticsRow> {
        let mut unique: BTreeSet<(&str, ParticipantId, &str)> = BTreeSet::new();
        for samples in snapshot.values() {
            for sample in samples {
                unique.insert((
                    sample.stimulus.as_str(),
                    sample.participant,
                    sample.experiment.as_str(),
                ));
            }
        }

        unique
            .into_iter()
            .map(|(stimulus, participant, experiment)| {
                ExperimentStatisticsRow::new(participant, experiment, stimulus)
            })
            .collect()
    }

    /// Fill every row from the snapshot. Rows whose participant is missing keep
    /// their defaults.
    pub fn aggregate_all(rows: &mut [ExperimentStatisticsRow], snapshot: &ParticipantSnapshot) {
        for row in rows.iter_mut() {
            match snapshot.get(&row.participant) {
                Some(samples) => Self::aggregate(row, samples),
                None => debug!(
                    participant = row.participant,
                    "participant not loaded; statistics row left empty"
                ),
            }
        }
    }

    /// Fill saccade and deviation metrics of `row` from the participant's samples
    pub fn aggregate(row: &mut ExperimentStatisticsRow, samples: &[Sample]) {
        let mut segment: Vec<&Sample> = samples.iter().filter(|s| row.matches(s)).collect();
        if segment.is_empty() {
            return;
        }
        segment.sort_by(|a, b| a.timeline_ms().total_cmp(&b.timeline_ms()));

        row.saccade_frequency = saccade_frequency(&segment);
        row.avg_saccade_duration = avg_saccade_episode_duration(&segment);
        row.avg_gaze_deviation = mean_positive_deviation(segment.iter().copied());
        row.avg_fixation_deviation =
            mean_positive_deviation(segment.iter().copied().filter(|s| s.is_fixation()));
        row.avg_saccade_deviation =
            mean_positive_deviation(segment.iter().copied().filter(|s| s.is_saccade()));
    }

    /// Average each metric over a participant's rows, skipping omitted values
    pub fn participant_summaries(rows: &[ExperimentStatisticsRow]) -> Vec<ParticipantSummary> {
        let mut by_participant: BTreeMap<ParticipantId, Vec<&ExperimentStatisticsRow>> =
            BTreeMap::new();
        for row in rows {
            by_participant.entry(row.participant).or_default().push(row);
        }

        by_participant
            .into_iter()
            .map(|(participant, rows)| ParticipantSummary {
                participant,
                saccade_frequency: mean(rows.iter().map(|r| Some(r.saccade_frequency))),
                avg_saccade_duration: mean(rows.iter().map(|r| Some(r.avg_saccade_duration))),
                avg_gaze_deviation: mean(rows.iter().map(|r| r.avg_gaze_deviation)),
                avg_fixation_deviation: mean(rows.iter().map(|r| r.avg_fixation_deviation)),
                avg_saccade_deviation: mean(rows.iter().map(|r| r.avg_saccade_deviation)),
                segments: rows.len(),
            })
            .collect()
    }
}

/// Saccades / (saccades + fixations); 0 when neither occurs
pub fn saccade_frequency(segment: &[&Sample]) -> f64 {
    let saccades = segment.iter().filter(|s| s.is_saccade()).count();
    let fixations = segment.iter().filter(|s| s.is_fixation()).count();
    let total = saccades + fixations;
    if total == 0 {
        0.0
    } else {
        saccades as f64 / total as f64
    }
}

/// Mean of the summed durations of maximal consecutive saccade runs; 0 without any
pub fn avg_saccade_episode_duration(segment: &[&Sample]) -> f64 {
    let mut episodes: Vec<f64> = Vec::new();
    let mut current: Option<f64> = None;

    for sample in segment {
        if sample.is_saccade() {
            let duration = sample.duration_ms.unwrap_or(0.0);
            current = Some(current.unwrap_or(0.0) + duration);
        } else if let Some(total) = current.take() {
            episodes.push(total);
        }
    }
    if let Some(total) = current {
        episodes.push(total);
    }

    mean(episodes.into_iter().map(Some)).unwrap_or(0.0)
}

/// Mean overall deviation over samples with a positive value
fn mean_positive_deviation<'a, I>(samples: I) -> Option<f64>
where
    I: Iterator<Item = &'a Sample>,
{
    mean(samples.map(|s| Some(s.overall_deviation()).filter(|d| *d > 0.0)))
}

fn mean<I>(values: I) -> Option<f64>
where
    I: Iterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
