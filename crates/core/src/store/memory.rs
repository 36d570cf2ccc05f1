use super::{RecordStore, RecordTable};
use crate::record::{NewPatientRecord, Priority, RecordId, Status};
use crate::snapshot::Snapshot;
use crate::state_machine::StatusFlow;
use crate::{PretriageError, PretriageResult};
use std::sync::RwLock;

/// Record store held entirely in memory.
///
/// Used by tests and by deployments that do not need records to outlive the process.
/// Reads share the lock; a write holds it only for one field of one record.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(&self, record: NewPatientRecord) -> PretriageResult<RecordId> {
        let mut table = self
            .table
            .write()
            .map_err(|_| PretriageError::poisoned("record table"))?;
        let id = table.insert(record);
        tracing::info!(%id, "created patient record");
        Ok(id)
    }

    fn fetch_all(&self) -> PretriageResult<Snapshot> {
        let table = self
            .table
            .read()
            .map_err(|_| PretriageError::poisoned("record table"))?;
        Ok(table.snapshot())
    }

    fn compare_and_set_status(
        &self,
        id: RecordId,
        expected: Status,
        new: Status,
        flow: StatusFlow,
    ) -> PretriageResult<()> {
        let mut table = self
            .table
            .write()
            .map_err(|_| PretriageError::poisoned("record table"))?;
        table.compare_and_set_status(id, expected, new, flow)
    }

    fn set_priority(&self, id: RecordId, priority: Option<Priority>) -> PretriageResult<()> {
        let mut table = self
            .table
            .write()
            .map_err(|_| PretriageError::poisoned("record table"))?;
        table.set_priority(id, priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::sample_new_record;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_writes_are_visible_to_next_fetch() {
        let store = MemoryRecordStore::new();
        let id = store.create(sample_new_record("Ana")).unwrap();
        let before = store.fetch_all().unwrap();

        store.set_priority(id, Some(Priority::Normal)).unwrap();

        assert_eq!(before.get(id).unwrap().priority, None);
        assert_eq!(
            store.fetch_all().unwrap().get(id).unwrap().priority,
            Some(Priority::Normal)
        );
    }

    #[test]
    fn test_racing_cas_has_exactly_one_winner() {
        for _ in 0..50 {
            let store = Arc::new(MemoryRecordStore::new());
            let id = store.create(sample_new_record("Ana")).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let contenders = [Status::InAttention, Status::Attended];
            let handles: Vec<_> = contenders
                .into_iter()
                .map(|target| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        let result = store.compare_and_set_status(
                            id,
                            Status::Pending,
                            target,
                            StatusFlow::ThreeState,
                        );
                        (target, result)
                    })
                })
                .collect();

            let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let winners: Vec<Status> = outcomes
                .iter()
                .filter(|(_, r)| r.is_ok())
                .map(|(t, _)| *t)
                .collect();
            assert_eq!(winners.len(), 1, "exactly one writer must win");
            for (_, result) in &outcomes {
                if let Err(e) = result {
                    assert!(
                        matches!(e, PretriageError::ConcurrencyConflict { .. }),
                        "loser must see a conflict, got {e:?}"
                    );
                }
            }
            assert_eq!(
                store.fetch_all().unwrap().get(id).unwrap().status,
                winners[0]
            );
        }
    }

    #[test]
    fn test_sequential_priority_writes_keep_the_last() {
        let store = MemoryRecordStore::new();
        let id = store.create(sample_new_record("Ana")).unwrap();
        store.set_priority(id, Some(Priority::Inmediata)).unwrap();
        store.set_priority(id, Some(Priority::Normal)).unwrap();
        assert_eq!(
            store.fetch_all().unwrap().get(id).unwrap().priority,
            Some(Priority::Normal)
        );
    }
}
