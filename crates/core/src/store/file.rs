use super::{RecordStore, RecordTable, RecordTableFile};
use crate::persist::{lock_table, read_table, write_table};
use crate::record::{NewPatientRecord, Priority, RecordId, Status};
use crate::snapshot::Snapshot;
use crate::state_machine::StatusFlow;
use crate::PretriageResult;
use std::path::{Path, PathBuf};

/// Record store backed by a JSON table file.
///
/// Every operation reads the file afresh, so rows written by another handle on the same file
/// (for example the CLI next to a running server) are seen immediately. Writers hold an
/// advisory lock on `records.json.lock` from load to replace, so compare-and-set stays atomic
/// across handles and processes. Readers take no lock.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    /// Open (or lazily create) the table at `path`.
    ///
    /// # Errors
    ///
    /// Fails if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> PretriageResult<Self> {
        let path = path.into();
        // Surface a corrupt table at startup rather than on the first request.
        load(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-modify-write under the table lock. The file is only replaced if `mutate` succeeds.
    fn update<R>(
        &self,
        mutate: impl FnOnce(&mut RecordTable) -> PretriageResult<R>,
    ) -> PretriageResult<R> {
        let _lock = lock_table(&self.path)?;
        let mut table = load(&self.path)?;
        let result = mutate(&mut table)?;
        write_table(&self.path, &RecordTableFile::from(&table))?;
        Ok(result)
    }
}

fn load(path: &Path) -> PretriageResult<RecordTable> {
    Ok(read_table::<RecordTableFile>(path)?
        .map(RecordTable::from)
        .unwrap_or_default())
}

impl RecordStore for FileRecordStore {
    fn create(&self, record: NewPatientRecord) -> PretriageResult<RecordId> {
        let id = self.update(|table| Ok(table.insert(record)))?;
        tracing::info!(%id, path = %self.path.display(), "created patient record");
        Ok(id)
    }

    fn fetch_all(&self) -> PretriageResult<Snapshot> {
        Ok(load(&self.path)?.snapshot())
    }

    fn compare_and_set_status(
        &self,
        id: RecordId,
        expected: Status,
        new: Status,
        flow: StatusFlow,
    ) -> PretriageResult<()> {
        self.update(|table| table.compare_and_set_status(id, expected, new, flow))
    }

    fn set_priority(&self, id: RecordId, priority: Option<Priority>) -> PretriageResult<()> {
        self.update(|table| table.set_priority(id, priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PretriageError;
    use crate::record::test_support::sample_new_record;
    use std::fs;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let id = {
            let store = FileRecordStore::open(&path).expect("open");
            let id = store.create(sample_new_record("Ana")).unwrap();
            store
                .compare_and_set_status(id, Status::Pending, Status::InAttention, StatusFlow::ThreeState)
                .unwrap();
            id
        };

        let reopened = FileRecordStore::open(&path).expect("reopen");
        let snapshot = reopened.fetch_all().unwrap();
        let record = snapshot.get(id).expect("record persisted");
        assert_eq!(record.status, Status::InAttention);
        assert_eq!(record.intake.name.as_str(), "Ana");
    }

    #[test]
    fn test_two_handles_share_one_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let server = FileRecordStore::open(&path).unwrap();
        let cli = FileRecordStore::open(&path).unwrap();

        let id = cli.create(sample_new_record("Ana")).unwrap();
        server.set_priority(id, Some(Priority::Prioritaria)).unwrap();

        let seen_by_cli = cli.fetch_all().unwrap();
        assert_eq!(
            seen_by_cli.get(id).unwrap().priority,
            Some(Priority::Prioritaria)
        );
    }

    #[test]
    fn test_cas_race_between_two_handles_has_one_winner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let setup = FileRecordStore::open(&path).unwrap();

        for _ in 0..50 {
            let id = setup.create(sample_new_record("Ana")).unwrap();
            let barrier = Arc::new(Barrier::new(2));
            let racers: Vec<_> = [Status::InAttention, Status::Attended]
                .into_iter()
                .map(|target| {
                    let store = FileRecordStore::open(&path).unwrap();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        store
                            .compare_and_set_status(id, Status::Pending, target, StatusFlow::ThreeState)
                            .map(|()| target)
                    })
                })
                .collect();
            let results: Vec<_> = racers
                .into_iter()
                .map(|h| h.join().expect("racer thread"))
                .collect();

            let winners: Vec<Status> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
            assert_eq!(winners.len(), 1, "exactly one CAS may win: {results:?}");
            assert!(results.iter().any(|r| matches!(
                r,
                Err(PretriageError::ConcurrencyConflict { .. })
            )));
            assert_eq!(setup.fetch_all().unwrap().get(id).unwrap().status, winners[0]);
        }
    }

    #[test]
    fn test_failed_cas_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let store = FileRecordStore::open(&path).unwrap();
        let id = store.create(sample_new_record("Ana")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let err = store
            .compare_and_set_status(id, Status::InAttention, Status::Attended, StatusFlow::ThreeState)
            .unwrap_err();
        assert!(matches!(err, PretriageError::ConcurrencyConflict { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_open_rejects_corrupt_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            FileRecordStore::open(&path),
            Err(PretriageError::Deserialization(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_empty_table() {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::open(dir.path().join("records.json")).unwrap();
        assert!(store.fetch_all().unwrap().is_empty());
    }
}
