//! Point-in-time views of the record table.
//!
//! A [`Snapshot`] is captured in one read from the store and never changes afterwards.
//! Viewers hold one until the next fetch replaces it.

use crate::record::{PatientRecord, Priority, RecordId, Status};
use crate::store::RecordStore;
use crate::PretriageResult;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable, timestamped mapping from id to record.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    records: BTreeMap<RecordId, PatientRecord>,
}

impl Snapshot {
    pub(crate) fn capture(
        records: impl IntoIterator<Item = PatientRecord>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            taken_at,
            records: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, id: RecordId) -> Option<&PatientRecord> {
        self.records.get(&id)
    }

    /// Records in id order.
    pub fn records(&self) -> impl Iterator<Item = &PatientRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching every criterion set on `filter`, in id order.
    pub fn filtered<'a>(&'a self, filter: &'a SnapshotFilter) -> Vec<&'a PatientRecord> {
        self.records().filter(|r| filter.matches(r)).collect()
    }
}

/// Display-side filter over a snapshot. Unset criteria match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    /// Case-insensitive substring of the patient name.
    pub name_contains: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
}

impl SnapshotFilter {
    pub fn matches(&self, record: &PatientRecord) -> bool {
        let name_ok = match self.name_contains.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => record.intake.name.contains_ignore_case(needle),
            _ => true,
        };
        let priority_ok = self.priority.map_or(true, |p| record.priority == Some(p));
        let status_ok = self.status.map_or(true, |s| record.status == s);
        name_ok && priority_ok && status_ok
    }
}

/// Pulls complete snapshots from a store on demand.
#[derive(Clone)]
pub struct SnapshotFetcher {
    store: Arc<dyn RecordStore>,
}

impl SnapshotFetcher {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Fetch the current record set.
    ///
    /// # Errors
    ///
    /// Propagates the store's error unchanged. Callers keep their previous snapshot on failure.
    pub fn fetch(&self) -> PretriageResult<Snapshot> {
        match self.store.fetch_all() {
            Ok(snapshot) => {
                tracing::debug!(
                    records = snapshot.len(),
                    taken_at = %snapshot.taken_at(),
                    "fetched snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!("snapshot fetch failed: {e}");
                Err(e)
            }
        }
    }
}
