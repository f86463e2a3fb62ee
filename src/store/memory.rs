//! In-memory record store

use super::RecordStore;
use crate::error::GazeError;
use crate::stats::ParticipantClass;
use crate::types::{
    ExperimentStatisticsRow, ParticipantId, ParticipantSnapshot, ParticipantSummary,
    ReferencePath, ReferencePaths, Sample,
};

/// Record store backed by in-process maps
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    participants: ParticipantSnapshot,
    reference_paths: ReferencePaths,
    experiment_statistics: Vec<ExperimentStatisticsRow>,
    participant_summaries: Vec<ParticipantSummary>,
    participant_classes: Vec<ParticipantClass>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from samples of any participants, grouped by participant
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut store = Self::new();
        for sample in samples {
            store
                .participants
                .entry(sample.participant)
                .or_default()
                .push(sample);
        }
        store
    }

    pub fn with_participant_classes(mut self, classes: Vec<ParticipantClass>) -> Self {
        self.participant_classes = classes;
        self
    }

    pub fn participants(&self) -> &ParticipantSnapshot {
        &self.participants
    }

    pub fn reference_paths(&self) -> &ReferencePaths {
        &self.reference_paths
    }

    pub fn experiment_statistics(&self) -> &[ExperimentStatisticsRow] {
        &self.experiment_statistics
    }

    pub fn participant_summaries(&self) -> &[ParticipantSummary] {
        &self.participant_summaries
    }
}

impl RecordStore for MemoryRecordStore {
    fn participant_ids(&self) -> Result<Vec<ParticipantId>, GazeError> {
        Ok(self.participants.keys().copied().collect())
    }

    fn load_participant(&self, participant: ParticipantId) -> Result<Vec<Sample>, GazeError> {
        self.participants
            .get(&participant)
            .cloned()
            .ok_or_else(|| GazeError::NotFound(format!("Participant_{participant}")))
    }

    fn save_participant(
        &mut self,
        participant: ParticipantId,
        samples: &[Sample],
    ) -> Result<(), GazeError> {
        self.participants.insert(participant, samples.to_vec());
        Ok(())
    }

    fn load_reference_path(&self, stimulus: &str) -> Result<Option<ReferencePath>, GazeError> {
        Ok(self.reference_paths.get(stimulus).cloned())
    }

    fn save_reference_path(&mut self, path: &ReferencePath) -> Result<(), GazeError> {
        self.reference_paths
            .insert(path.stimulus.clone(), path.clone());
        Ok(())
    }

    fn save_experiment_statistics(
        &mut self,
        rows: &[ExperimentStatisticsRow],
    ) -> Result<(), GazeError> {
        self.experiment_statistics = rows.to_vec();
        Ok(())
    }

    fn save_participant_summaries(
        &mut self,
        summaries: &[ParticipantSummary],
    ) -> Result<(), GazeError> {
        self.participant_summaries = summaries.to_vec();
        Ok(())
    }

    fn load_participant_classes(&self) -> Result<Vec<ParticipantClass>, GazeError> {
        Ok(self.participant_classes.clone())
    }
}
