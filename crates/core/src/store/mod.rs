//! Record Store: the single source of truth for patient records.
//!
//! All mutation goes through two primitives, each atomic for one field of one record:
//!
//! - [`RecordStore::compare_and_set_status`] for `status`, the only conflict-sensitive field;
//! - [`RecordStore::set_priority`] for `priority`, last-writer-wins.
//!
//! Nothing locks across records or across fields. Successful writes are visible to the next
//! [`RecordStore::fetch_all`]; stores keep no cache of their own.

mod file;
mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use crate::record::{NewPatientRecord, PatientRecord, Priority, RecordId, Status};
use crate::snapshot::Snapshot;
use crate::state_machine::StatusFlow;
use crate::{PretriageError, PretriageResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable table of patient records.
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return its store-assigned id.
    fn create(&self, record: NewPatientRecord) -> PretriageResult<RecordId>;

    /// Capture every record in one consistent read.
    fn fetch_all(&self) -> PretriageResult<Snapshot>;

    /// Conditionally write `status`.
    ///
    /// The write applies only if the stored status still equals `expected` and the transition
    /// from the stored status to `new` is legal under `flow`. Both checks and the write happen
    /// atomically. Nothing is mutated on failure.
    ///
    /// # Errors
    ///
    /// - [`PretriageError::InvalidTransition`] if `new` is unreachable from `expected`,
    ///   whatever the stored status is,
    /// - [`PretriageError::ConcurrencyConflict`] if the stored status is not `expected`,
    /// - [`PretriageError::InvalidTransition`] if the stored status cannot move to `new`,
    /// - [`PretriageError::RecordNotFound`] if `id` is unknown,
    /// - store infrastructure errors.
    fn compare_and_set_status(
        &self,
        id: RecordId,
        expected: Status,
        new: Status,
        flow: StatusFlow,
    ) -> PretriageResult<()>;

    /// Unconditionally write `priority` (last writer wins).
    fn set_priority(&self, id: RecordId, priority: Option<Priority>) -> PretriageResult<()>;
}

// ============================================================================
// RECORD TABLE
// ============================================================================

/// In-memory form of the table, shared by both store implementations.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct RecordTable {
    next_id: u64,
    records: BTreeMap<RecordId, PatientRecord>,
}

/// On-disk layout: records as a list so the file does not depend on map-key encoding.
#[derive(Serialize, Deserialize)]
struct RecordTableFile {
    next_id: u64,
    records: Vec<PatientRecord>,
}

impl From<&RecordTable> for RecordTableFile {
    fn from(table: &RecordTable) -> Self {
        Self {
            next_id: table.next_id,
            records: table.records.values().cloned().collect(),
        }
    }
}

impl From<RecordTableFile> for RecordTable {
    fn from(file: RecordTableFile) -> Self {
        let records: BTreeMap<RecordId, PatientRecord> =
            file.records.into_iter().map(|r| (r.id, r)).collect();
        // Never reissue an id, even if the counter on disk lags behind the rows.
        let max_id = records.keys().next_back().map_or(0, |id| id.get());
        Self {
            next_id: file.next_id.max(max_id),
            records,
        }
    }
}

impl RecordTable {
    pub(crate) fn insert(&mut self, record: NewPatientRecord) -> RecordId {
        self.next_id += 1;
        let id = RecordId::new(self.next_id);
        self.records.insert(id, record.into_record(id, Utc::now()));
        id
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.records.values().cloned(), Utc::now())
    }

    pub(crate) fn compare_and_set_status(
        &mut self,
        id: RecordId,
        expected: Status,
        new: Status,
        flow: StatusFlow,
    ) -> PretriageResult<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(PretriageError::RecordNotFound(id))?;
        // A request that is illegal from its own expected value can never apply.
        flow.validate_transition(expected, new)?;
        if record.status != expected {
            return Err(PretriageError::ConcurrencyConflict {
                id,
                expected,
                current: record.status,
            });
        }
        flow.validate_transition(record.status, new)?;
        record.status = new;
        Ok(())
    }

    pub(crate) fn set_priority(
        &mut self,
        id: RecordId,
        priority: Option<Priority>,
    ) -> PretriageResult<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(PretriageError::RecordNotFound(id))?;
        record.priority = priority;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::sample_new_record;
    use crate::state_machine::TransitionError;

    const FLOW: StatusFlow = StatusFlow::ThreeState;

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut table = RecordTable::default();
        assert_eq!(table.insert(sample_new_record("Ana")), RecordId::new(1));
        assert_eq!(table.insert(sample_new_record("Bruno")), RecordId::new(2));
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn test_cas_applies_when_expected_matches() {
        let mut table = RecordTable::default();
        let id = table.insert(sample_new_record("Ana"));
        table
            .compare_and_set_status(id, Status::Pending, Status::InAttention, FLOW)
            .expect("cas should apply");
        assert_eq!(
            table.snapshot().get(id).unwrap().status,
            Status::InAttention
        );
    }

    #[test]
    fn test_cas_conflict_leaves_record_untouched() {
        let mut table = RecordTable::default();
        let id = table.insert(sample_new_record("Ana"));
        table
            .compare_and_set_status(id, Status::Pending, Status::InAttention, FLOW)
            .unwrap();
        let before = table.clone();

        let err = table
            .compare_and_set_status(id, Status::Pending, Status::Attended, FLOW)
            .unwrap_err();
        match err {
            PretriageError::ConcurrencyConflict {
                expected, current, ..
            } => {
                assert_eq!(expected, Status::Pending);
                assert_eq!(current, Status::InAttention);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(table, before);
    }

    #[test]
    fn test_cas_checks_transition_against_stored_value() {
        let mut table = RecordTable::default();
        let id = table.insert(sample_new_record("Ana"));
        table
            .compare_and_set_status(id, Status::Pending, Status::Attended, FLOW)
            .unwrap();

        let err = table
            .compare_and_set_status(id, Status::Attended, Status::Pending, FLOW)
            .unwrap_err();
        assert!(matches!(
            err,
            PretriageError::InvalidTransition(TransitionError::Backward { .. })
        ));
    }

    #[test]
    fn test_backward_request_is_invalid_even_after_a_concurrent_change() {
        let mut table = RecordTable::default();
        let id = table.insert(sample_new_record("Ana"));
        table
            .compare_and_set_status(id, Status::Pending, Status::InAttention, FLOW)
            .unwrap();
        let before = table.clone();

        let err = table
            .compare_and_set_status(id, Status::Attended, Status::Pending, FLOW)
            .unwrap_err();
        assert!(matches!(
            err,
            PretriageError::InvalidTransition(TransitionError::Backward { .. })
        ));
        assert_eq!(table, before);
    }

    #[test]
    fn test_cas_unknown_record() {
        let mut table = RecordTable::default();
        let err = table
            .compare_and_set_status(RecordId::new(3), Status::Pending, Status::Attended, FLOW)
            .unwrap_err();
        assert!(matches!(err, PretriageError::RecordNotFound(id) if id == RecordId::new(3)));
    }

    #[test]
    fn test_file_layout_round_trip_keeps_counter_ahead_of_rows() {
        let mut table = RecordTable::default();
        table.insert(sample_new_record("Ana"));
        table.insert(sample_new_record("Bruno"));

        let mut file = RecordTableFile::from(&table);
        file.next_id = 0;
        let mut restored = RecordTable::from(file);
        assert_eq!(restored.insert(sample_new_record("Carla")), RecordId::new(3));
    }
}
