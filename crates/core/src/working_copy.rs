//! A viewer's editable copy of its snapshot.
//!
//! Only `status` and `priority` can be changed, and only through the setters. Each edit
//! remembers the value the viewer saw when it first touched the field (its *observed* value).
//! That observed value is what a later compare-and-set expects to find in the store, even if
//! the copy has been rebased onto newer snapshots in between. Each edit also tracks its base:
//! the field's value in the snapshot the copy currently sits on.

use crate::record::{Field, FieldValue, PatientRecord, Priority, RecordId, Status};
use crate::snapshot::Snapshot;
use crate::{PretriageError, PretriageResult};
use std::collections::BTreeMap;

/// A locally edited field whose stored value moved on since the viewer observed it.
///
/// Reported on refresh so the viewer knows the pending edit will be rejected on submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleEdit {
    pub id: RecordId,
    pub field: Field,
    pub observed: FieldValue,
    pub current: FieldValue,
    pub local: FieldValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Edit {
    observed: FieldValue,
    base: FieldValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkingCopy {
    records: BTreeMap<RecordId, PatientRecord>,
    edits: BTreeMap<(RecordId, Field), Edit>,
}

impl WorkingCopy {
    /// A copy with no local edits.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            records: snapshot.records().map(|r| (r.id, r.clone())).collect(),
            edits: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&PatientRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PatientRecord> {
        self.records.values()
    }

    pub fn set_status(&mut self, id: RecordId, status: Status) -> PretriageResult<()> {
        self.set(id, FieldValue::Status(status))
    }

    pub fn set_priority(&mut self, id: RecordId, priority: Option<Priority>) -> PretriageResult<()> {
        self.set(id, FieldValue::Priority(priority))
    }

    /// Value the viewer saw before editing `field`, if it has been edited.
    pub fn observed(&self, id: RecordId, field: Field) -> Option<FieldValue> {
        self.edits.get(&(id, field)).map(|edit| edit.observed)
    }

    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Edited fields, in id order.
    pub fn edited_fields(&self) -> impl Iterator<Item = (RecordId, Field)> + '_ {
        self.edits.keys().copied()
    }

    fn set(&mut self, id: RecordId, value: FieldValue) -> PretriageResult<()> {
        let field = match value {
            FieldValue::Status(_) => Field::Status,
            FieldValue::Priority(_) => Field::Priority,
        };
        let record = self
            .records
            .get_mut(&id)
            .ok_or(PretriageError::RecordNotFound(id))?;
        let current = record.value_of(field);
        let edit = *self.edits.entry((id, field)).or_insert(Edit {
            observed: current,
            base: current,
        });
        if value == edit.base || value == edit.observed {
            // Undone: show the base value again, even if the first-seen value was older.
            self.edits.remove(&(id, field));
            record.assign(edit.base);
        } else {
            record.assign(value);
        }
        Ok(())
    }

    /// Drop the edit of `field` if it still holds `submitted`, showing the base value again.
    ///
    /// Used after a submit: the submitted value either reached the store or was rejected,
    /// and in both cases the doctor should see the stored value. An edit changed again while
    /// the submit ran is kept.
    pub(crate) fn settle(&mut self, id: RecordId, field: Field, submitted: FieldValue) {
        let (Some(edit), Some(record)) =
            (self.edits.get(&(id, field)).copied(), self.records.get_mut(&id))
        else {
            return;
        };
        if record.value_of(field) == submitted {
            record.assign(edit.base);
            self.edits.remove(&(id, field));
        }
    }

    /// Merge a fresh snapshot into this copy.
    ///
    /// Untouched fields take the fresh values. Locally edited fields keep the local value and
    /// their observed value, unless the store already holds the local value, in which case the
    /// edit is dropped as converged. Records absent from `fresh` are dropped with their edits.
    pub(crate) fn rebase(&self, fresh: &Snapshot) -> (WorkingCopy, Vec<StaleEdit>) {
        let mut merged = WorkingCopy::from_snapshot(fresh);
        let mut stale = Vec::new();

        for (&(id, field), edit) in &self.edits {
            let (Some(local), Some(target)) = (self.records.get(&id), merged.records.get_mut(&id))
            else {
                continue;
            };
            let local_value = local.value_of(field);
            let current = target.value_of(field);
            if local_value == current {
                continue;
            }
            target.assign(local_value);
            merged.edits.insert(
                (id, field),
                Edit {
                    observed: edit.observed,
                    base: current,
                },
            );
            if edit.observed != current {
                stale.push(StaleEdit {
                    id,
                    field,
                    observed: edit.observed,
                    current,
                    local: local_value,
                });
            }
        }

        (merged, stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::sample_new_record;
    use chrono::Utc;

    fn snapshot(statuses: &[(u64, Status, Option<Priority>)]) -> Snapshot {
        let now = Utc::now();
        Snapshot::capture(
            statuses.iter().map(|(id, status, priority)| {
                let mut r = sample_new_record("Ana").into_record(RecordId::new(*id), now);
                r.status = *status;
                r.priority = *priority;
                r
            }),
            now,
        )
    }

    #[test]
    fn test_fresh_copy_has_no_edits() {
        let copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        assert!(!copy.has_edits());
        assert_eq!(copy.get(RecordId::new(1)).unwrap().status, Status::Pending);
    }

    #[test]
    fn test_edit_records_first_observed_value() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_status(id, Status::InAttention).unwrap();
        copy.set_status(id, Status::Attended).unwrap();

        assert_eq!(
            copy.observed(id, Field::Status),
            Some(FieldValue::Status(Status::Pending))
        );
        assert_eq!(copy.get(id).unwrap().status, Status::Attended);
    }

    #[test]
    fn test_editing_back_clears_the_edit() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_priority(id, Some(Priority::Normal)).unwrap();
        copy.set_priority(id, None).unwrap();
        assert!(!copy.has_edits());
    }

    #[test]
    fn test_unknown_record_cannot_be_edited() {
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        assert!(matches!(
            copy.set_status(RecordId::new(2), Status::Attended),
            Err(PretriageError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_rebase_without_edits_equals_fresh_snapshot() {
        let old = snapshot(&[(1, Status::Pending, None)]);
        let fresh = snapshot(&[
            (1, Status::InAttention, Some(Priority::Normal)),
            (2, Status::Pending, None),
        ]);
        let (merged, stale) = WorkingCopy::from_snapshot(&old).rebase(&fresh);
        assert_eq!(merged, WorkingCopy::from_snapshot(&fresh));
        assert!(stale.is_empty());
    }

    #[test]
    fn test_rebase_keeps_local_edit_and_refreshes_untouched_field() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_priority(id, Some(Priority::Inmediata)).unwrap();

        let fresh = snapshot(&[(1, Status::InAttention, None)]);
        let (merged, stale) = copy.rebase(&fresh);

        let record = merged.get(id).unwrap();
        assert_eq!(record.priority, Some(Priority::Inmediata));
        assert_eq!(record.status, Status::InAttention);
        assert!(stale.is_empty());
        assert_eq!(
            merged.observed(id, Field::Priority),
            Some(FieldValue::Priority(None))
        );
    }

    #[test]
    fn test_rebase_flags_edit_whose_base_moved() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_status(id, Status::Attended).unwrap();

        let fresh = snapshot(&[(1, Status::InAttention, None)]);
        let (merged, stale) = copy.rebase(&fresh);

        assert_eq!(merged.get(id).unwrap().status, Status::Attended);
        assert_eq!(
            merged.observed(id, Field::Status),
            Some(FieldValue::Status(Status::Pending))
        );
        assert_eq!(
            stale,
            vec![StaleEdit {
                id,
                field: Field::Status,
                observed: FieldValue::Status(Status::Pending),
                current: FieldValue::Status(Status::InAttention),
                local: FieldValue::Status(Status::Attended),
            }]
        );
    }

    #[test]
    fn test_rebase_drops_edit_that_store_already_holds() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_status(id, Status::InAttention).unwrap();

        let fresh = snapshot(&[(1, Status::InAttention, None)]);
        let (merged, _) = copy.rebase(&fresh);
        assert!(!merged.has_edits());
    }

    #[test]
    fn test_undo_after_rebase_shows_the_fresh_value() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_status(id, Status::Attended).unwrap();

        let fresh = snapshot(&[(1, Status::InAttention, None)]);
        let (mut merged, _) = copy.rebase(&fresh);
        merged.set_status(id, Status::Pending).unwrap();

        assert!(!merged.has_edits());
        assert_eq!(merged.get(id).unwrap().status, Status::InAttention);
        assert!(crate::reconcile::PendingEdit::between(&fresh, &merged).is_empty());
    }

    #[test]
    fn test_priority_undo_after_rebase_keeps_other_doctors_value() {
        let id = RecordId::new(1);
        let mut copy = WorkingCopy::from_snapshot(&snapshot(&[(1, Status::Pending, None)]));
        copy.set_priority(id, Some(Priority::Inmediata)).unwrap();

        let fresh = snapshot(&[(1, Status::Pending, Some(Priority::Normal))]);
        let (mut merged, _) = copy.rebase(&fresh);
        merged.set_priority(id, None).unwrap();

        assert!(!merged.has_edits());
        assert_eq!(merged.get(id).unwrap().priority, Some(Priority::Normal));
        assert!(crate::reconcile::PendingEdit::between(&fresh, &merged).is_empty());
    }

    #[test]
    fn test_settle_keeps_edit_changed_after_submit() {
        let id = RecordId::new(1);
        let base = snapshot(&[(1, Status::Pending, None)]);
        let mut copy = WorkingCopy::from_snapshot(&base);
        copy.set_status(id, Status::InAttention).unwrap();
        copy.set_priority(id, Some(Priority::Alta)).unwrap();

        copy.settle(id, Field::Status, FieldValue::Status(Status::InAttention));
        copy.settle(id, Field::Priority, FieldValue::Priority(Some(Priority::Normal)));

        assert_eq!(copy.get(id).unwrap().status, Status::Pending);
        assert_eq!(copy.get(id).unwrap().priority, Some(Priority::Alta));
        assert_eq!(copy.edited_fields().collect::<Vec<_>>(), vec![(id, Field::Priority)]);
    }
}
