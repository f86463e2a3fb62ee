//! Record stores
//!
//! The pipeline reads participant record sets from, and writes its results back
//! to, a `RecordStore`. Two implementations are provided: an in-memory store and
//! a directory of CSV files using the tracker's column names.

mod files;
mod memory;

pub use files::{
    read_participant_records, read_reference_path, write_participant_records,
    write_reference_path, CsvRecordStore,
};
pub use memory::MemoryRecordStore;

use crate::error::GazeError;
use crate::stats::ParticipantClass;
use crate::types::{
    ExperimentStatisticsRow, ParticipantId, ParticipantSnapshot, ParticipantSummary,
    ReferencePath, Sample,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A record set that was left out of a run, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecordSet {
    pub record_set: String,
    pub reason: String,
}

/// Trait for record stores
pub trait RecordStore {
    /// Participants with a stored record set, ascending
    fn participant_ids(&self) -> Result<Vec<ParticipantId>, GazeError>;

    /// All samples of one participant, in stored order
    fn load_participant(&self, participant: ParticipantId) -> Result<Vec<Sample>, GazeError>;

    /// Replace the stored samples of one participant
    fn save_participant(
        &mut self,
        participant: ParticipantId,
        samples: &[Sample],
    ) -> Result<(), GazeError>;

    fn load_reference_path(&self, stimulus: &str) -> Result<Option<ReferencePath>, GazeError>;

    fn save_reference_path(&mut self, path: &ReferencePath) -> Result<(), GazeError>;

    fn save_experiment_statistics(
        &mut self,
        rows: &[ExperimentStatisticsRow],
    ) -> Result<(), GazeError>;

    fn save_participant_summaries(
        &mut self,
        summaries: &[ParticipantSummary],
    ) -> Result<(), GazeError>;

    /// Group membership from the participant metadata; empty when none is stored
    fn load_participant_classes(&self) -> Result<Vec<ParticipantClass>, GazeError>;

    /// Load every participant into one snapshot for the run.
    ///
    /// Record sets failing with a local error (missing columns, unreadable rows)
    /// are logged and reported as skipped; other errors abort the load.
    fn load_snapshot(&self) -> Result<(ParticipantSnapshot, Vec<SkippedRecordSet>), GazeError> {
        let mut snapshot = ParticipantSnapshot::new();
        let mut skipped = Vec::new();

        for participant in self.participant_ids()? {
            match self.load_participant(participant) {
                Ok(samples) => {
                    snapshot.insert(participant, samples);
                }
                Err(e) if e.is_local() => {
                    warn!(participant, error = %e, "skipping participant record set");
                    skipped.push(SkippedRecordSet {
                        record_set: format!("Participant_{participant}"),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok((snapshot, skipped))
    }
}
