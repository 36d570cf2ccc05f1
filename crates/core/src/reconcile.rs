//! Edit Reconciler.
//!
//! Turns a viewer's `(snapshot, working copy)` pair into the minimal set of per-field writes
//! and applies each one independently:
//!
//! - `status` goes through compare-and-set, expecting the value the viewer observed. If another
//!   viewer changed it in the meantime the write is rejected as a conflict instead of
//!   overwriting a value this viewer never saw.
//! - `priority` is written unconditionally; last writer wins.
//!
//! There is no transaction across records or fields. The result reports every field's
//! outcome so the caller can re-decide the ones that did not apply.

use crate::record::{Field, FieldValue, Priority, RecordId, Status};
use crate::snapshot::Snapshot;
use crate::state_machine::TransitionError;
use crate::store::RecordStore;
use crate::vocabulary::Vocabulary;
use crate::working_copy::WorkingCopy;
use crate::PretriageError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// PENDING EDIT
// ============================================================================

/// One requested field change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldChange {
    Status { expected: Status, requested: Status },
    Priority { requested: Option<Priority> },
}

impl FieldChange {
    pub fn field(&self) -> Field {
        match self {
            FieldChange::Status { .. } => Field::Status,
            FieldChange::Priority { .. } => Field::Priority,
        }
    }

    pub fn requested_value(&self) -> FieldValue {
        match *self {
            FieldChange::Status { requested, .. } => FieldValue::Status(requested),
            FieldChange::Priority { requested } => FieldValue::Priority(requested),
        }
    }
}

/// Typed change-set: per record, the fields a viewer changed.
///
/// Built at submit time, consumed by [`Reconciler::apply`], then dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingEdit {
    changes: BTreeMap<RecordId, Vec<FieldChange>>,
}

impl PendingEdit {
    /// Diff `working` against `snapshot`, field by field.
    ///
    /// Only records present in both are considered. A field is changed when the working value
    /// differs from the snapshot value. The expected value of a status change is the value
    /// the viewer observed when it made the edit, which is the snapshot's value unless the
    /// copy has been rebased since.
    pub fn between(snapshot: &Snapshot, working: &WorkingCopy) -> Self {
        let mut edit = PendingEdit::default();
        for local in working.records() {
            let Some(base) = snapshot.get(local.id) else {
                tracing::debug!(id = %local.id, "record not in snapshot, skipping");
                continue;
            };

            if local.status != base.status {
                let expected = match working.observed(local.id, Field::Status) {
                    Some(FieldValue::Status(observed)) => observed,
                    _ => base.status,
                };
                edit.push(
                    local.id,
                    FieldChange::Status {
                        expected,
                        requested: local.status,
                    },
                );
            }
            if local.priority != base.priority {
                edit.push(
                    local.id,
                    FieldChange::Priority {
                        requested: local.priority,
                    },
                );
            }
        }
        edit
    }

    pub fn push(&mut self, id: RecordId, change: FieldChange) {
        self.changes.entry(id).or_default().push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of records with at least one change.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &[FieldChange])> {
        self.changes.iter().map(|(id, c)| (*id, c.as_slice()))
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// What happened to one field write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldOutcome {
    Applied,
    /// Another viewer changed the field first. Refetch and re-decide.
    Conflict { expected: Status, current: Status },
    /// The stored status cannot move to the requested one.
    InvalidTransition(TransitionError),
    /// The requested value is not part of the deployment vocabulary.
    Invalid(String),
    NotFound,
    /// Store failure; the write may be retried.
    Failed(String),
}

impl FieldOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FieldOutcome::Applied)
    }

    fn from_error(err: PretriageError) -> Self {
        match err {
            PretriageError::ConcurrencyConflict {
                expected, current, ..
            } => FieldOutcome::Conflict { expected, current },
            PretriageError::InvalidTransition(e) => FieldOutcome::InvalidTransition(e),
            PretriageError::Validation { reason, .. } => FieldOutcome::Invalid(reason),
            PretriageError::RecordNotFound(_) => FieldOutcome::NotFound,
            other => FieldOutcome::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for FieldOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOutcome::Applied => f.write_str("applied"),
            FieldOutcome::Conflict { expected, current } => write!(
                f,
                "record changed since you loaded it (you saw {expected}, now {current})"
            ),
            FieldOutcome::InvalidTransition(e) => write!(f, "invalid transition: {e}"),
            FieldOutcome::Invalid(reason) => write!(f, "invalid value: {reason}"),
            FieldOutcome::NotFound => f.write_str("record not found"),
            FieldOutcome::Failed(reason) => write!(f, "write failed: {reason}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldResult {
    pub field: Field,
    pub outcome: FieldOutcome,
}

/// Summary of a record's field outcomes, worst first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied,
    Conflict,
    InvalidTransition,
    Invalid,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordResult {
    pub id: RecordId,
    pub fields: Vec<FieldResult>,
}

impl RecordResult {
    pub fn outcome(&self) -> RecordOutcome {
        let has = |pred: fn(&FieldOutcome) -> bool| self.fields.iter().any(|f| pred(&f.outcome));
        if has(|o| matches!(o, FieldOutcome::Conflict { .. })) {
            RecordOutcome::Conflict
        } else if has(|o| matches!(o, FieldOutcome::InvalidTransition(_))) {
            RecordOutcome::InvalidTransition
        } else if has(|o| matches!(o, FieldOutcome::Invalid(_) | FieldOutcome::NotFound)) {
            RecordOutcome::Invalid
        } else if has(|o| matches!(o, FieldOutcome::Failed(_))) {
            RecordOutcome::Failed
        } else {
            RecordOutcome::Applied
        }
    }
}

/// A field that did not apply, surfaced to the viewer for re-decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub id: RecordId,
    pub field: Field,
    pub outcome: FieldOutcome,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} {}: {}", self.id, self.field, self.outcome)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub results: Vec<RecordResult>,
}

impl ReconcileReport {
    pub fn applied_count(&self) -> usize {
        self.results
            .iter()
            .flat_map(|r| &r.fields)
            .filter(|f| f.outcome.is_applied())
            .count()
    }

    pub fn rejections(&self) -> Vec<Rejection> {
        self.results
            .iter()
            .flat_map(|r| {
                r.fields
                    .iter()
                    .filter(|f| !f.outcome.is_applied())
                    .map(move |f| Rejection {
                        id: r.id,
                        field: f.field,
                        outcome: f.outcome.clone(),
                    })
            })
            .collect()
    }

    pub fn all_applied(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome() == RecordOutcome::Applied)
    }

    pub fn get(&self, id: RecordId) -> Option<&RecordResult> {
        self.results.iter().find(|r| r.id == id)
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    vocabulary: Vocabulary,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>, vocabulary: Vocabulary) -> Self {
        Self { store, vocabulary }
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.vocabulary
    }

    /// Diff and apply in one step.
    pub fn reconcile(&self, snapshot: &Snapshot, working: &WorkingCopy) -> ReconcileReport {
        self.apply(PendingEdit::between(snapshot, working))
    }

    /// Apply each change independently and report per-record outcomes.
    pub fn apply(&self, edit: PendingEdit) -> ReconcileReport {
        let results = edit
            .changes
            .into_iter()
            .map(|(id, changes)| RecordResult {
                id,
                fields: changes
                    .into_iter()
                    .map(|change| FieldResult {
                        field: change.field(),
                        outcome: self.apply_change(id, change),
                    })
                    .collect(),
            })
            .collect();
        ReconcileReport { results }
    }

    fn apply_change(&self, id: RecordId, change: FieldChange) -> FieldOutcome {
        let result = match change {
            FieldChange::Status {
                expected,
                requested,
            } => self.store.compare_and_set_status(
                id,
                expected,
                requested,
                self.vocabulary.status_flow,
            ),
            FieldChange::Priority { requested } => self
                .vocabulary
                .check_priority(requested)
                .and_then(|()| self.store.set_priority(id, requested)),
        };

        let outcome = match result {
            Ok(()) => FieldOutcome::Applied,
            Err(e) => FieldOutcome::from_error(e),
        };
        match &outcome {
            FieldOutcome::Applied => {
                tracing::info!(%id, field = %change.field(), "applied edit")
            }
            FieldOutcome::Failed(reason) => {
                tracing::error!(%id, field = %change.field(), "edit failed: {reason}")
            }
            rejected => {
                tracing::warn!(%id, field = %change.field(), "edit rejected: {rejected}")
            }
        }
        outcome
    }
}
