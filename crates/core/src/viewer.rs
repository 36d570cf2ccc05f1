//! Viewer Session: one doctor's view of the record table.
//!
//! A session owns exactly one [`Snapshot`] and the [`WorkingCopy`] derived from it. Refreshing
//! replaces the snapshot and rebases the working copy so unsubmitted edits survive. Submitting
//! hands the pair to the [`Reconciler`], then refetches so rejected fields show current data.
//!
//! Submits take `&mut self`, so a session cannot start a second reconciliation while one is
//! running. The scheduled task in [`crate::scheduler`] drives a session on a timer.

use crate::reconcile::{PendingEdit, ReconcileReport, Reconciler, Rejection};
use crate::record::{PatientRecord, Priority, RecordId, Status};
use crate::session::{Role, SessionContext};
use crate::snapshot::{Snapshot, SnapshotFetcher, SnapshotFilter};
use crate::store::RecordStore;
use crate::vocabulary::Vocabulary;
use crate::working_copy::{StaleEdit, WorkingCopy};
use crate::PretriageResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of merging a fresh snapshot into the session.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshSummary {
    pub taken_at: DateTime<Utc>,
    pub records: usize,
    /// Local edits carried over to the new working copy.
    pub preserved_edits: usize,
    /// Carried-over edits whose stored value moved on; these will be rejected on submit.
    pub stale_edits: Vec<StaleEdit>,
}

/// Outcome of a submit.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitReport {
    pub report: ReconcileReport,
    /// Set when the post-submit refetch failed and the session kept its previous snapshot.
    pub refresh_error: Option<String>,
}

impl SubmitReport {
    pub fn rejections(&self) -> Vec<Rejection> {
        self.report.rejections()
    }
}

pub struct ViewerSession {
    ctx: SessionContext,
    fetcher: SnapshotFetcher,
    reconciler: Reconciler,
    snapshot: Snapshot,
    working: WorkingCopy,
}

impl ViewerSession {
    /// Open a session for a doctor and take its first snapshot.
    ///
    /// # Errors
    ///
    /// - [`crate::PretriageError::Forbidden`] unless `ctx` is a doctor session,
    /// - the store's error if the initial fetch fails.
    pub fn open(
        ctx: SessionContext,
        store: Arc<dyn RecordStore>,
        vocabulary: Vocabulary,
    ) -> PretriageResult<Self> {
        ctx.require(Role::Doctor, "fetch records")?;
        let fetcher = SnapshotFetcher::new(store.clone());
        let snapshot = fetcher.fetch()?;
        let working = WorkingCopy::from_snapshot(&snapshot);
        tracing::info!(
            user = %ctx.username(),
            session = %ctx.session_id(),
            records = snapshot.len(),
            "viewer session opened"
        );
        Ok(Self {
            ctx,
            fetcher,
            reconciler: Reconciler::new(store, vocabulary),
            snapshot,
            working,
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn working_copy(&self) -> &WorkingCopy {
        &self.working
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.reconciler.vocabulary()
    }

    /// Working-copy records matching `filter`, in id order.
    pub fn view(&self, filter: &SnapshotFilter) -> Vec<PatientRecord> {
        self.working
            .records()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Edit a record's status locally. Only values in the deployment's flow are accepted.
    pub fn set_status(&mut self, id: RecordId, status: Status) -> PretriageResult<()> {
        self.vocabulary().check_status(status)?;
        self.working.set_status(id, status)
    }

    /// Edit a record's priority locally. `None` clears it.
    pub fn set_priority(&mut self, id: RecordId, priority: Option<Priority>) -> PretriageResult<()> {
        self.vocabulary().check_priority(priority)?;
        self.working.set_priority(id, priority)
    }

    /// The change-set a submit would issue right now.
    pub fn pending_edit(&self) -> PendingEdit {
        PendingEdit::between(&self.snapshot, &self.working)
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.pending_edit().is_empty()
    }

    /// Fetch a fresh snapshot and merge it in.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous snapshot and working copy are kept.
    pub fn refresh(&mut self) -> PretriageResult<RefreshSummary> {
        let fetched = self.fetcher.fetch();
        self.absorb(fetched)
    }

    /// Merge the result of a fetch performed elsewhere.
    pub fn absorb(&mut self, fetched: PretriageResult<Snapshot>) -> PretriageResult<RefreshSummary> {
        let fresh = fetched?;
        let (working, stale_edits) = self.working.rebase(&fresh);
        for edit in &stale_edits {
            tracing::warn!(
                id = %edit.id,
                field = %edit.field,
                "local edit is based on a value that has since changed"
            );
        }
        let summary = RefreshSummary {
            taken_at: fresh.taken_at(),
            records: fresh.len(),
            preserved_edits: working.edited_fields().count(),
            stale_edits,
        };
        self.snapshot = fresh;
        self.working = working;
        Ok(summary)
    }

    /// Reconcile local edits with the store, then refetch.
    ///
    /// Never retries a rejected field. Rejections are returned for the doctor to re-decide
    /// against the refreshed data.
    pub fn submit(&mut self) -> SubmitReport {
        let submitted = self.pending_edit();
        let report = self.reconciler.apply(submitted.clone());
        let fetched = self.fetcher.fetch();
        self.finish_submit(&submitted, report, fetched)
    }

    /// Install the post-submit snapshot and settle the submitted fields.
    ///
    /// Submitted fields show the stored value again, whether they applied or were rejected.
    /// Fields edited again after `submitted` was taken keep their local value.
    pub(crate) fn finish_submit(
        &mut self,
        submitted: &PendingEdit,
        report: ReconcileReport,
        fetched: PretriageResult<Snapshot>,
    ) -> SubmitReport {
        let refresh_error = match fetched {
            Ok(fresh) => {
                self.snapshot = fresh;
                None
            }
            Err(e) => {
                tracing::warn!("refetch after submit failed, keeping previous snapshot: {e}");
                Some(e.to_string())
            }
        };
        let (mut working, _) = self.working.rebase(&self.snapshot);
        for (id, changes) in submitted.iter() {
            for change in changes {
                working.settle(id, change.field(), change.requested_value());
            }
        }
        self.working = working;

        let rejected = report.rejections().len();
        tracing::info!(
            user = %self.ctx.username(),
            applied = report.applied_count(),
            rejected,
            "submit finished"
        );
        SubmitReport {
            report,
            refresh_error,
        }
    }

    pub(crate) fn fetcher(&self) -> &SnapshotFetcher {
        &self.fetcher
    }

    pub(crate) fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// End the session, discarding its snapshot and any unsubmitted edits.
    pub fn logout(self) {
        let discarded = self.working.edited_fields().count();
        tracing::info!(
            user = %self.ctx.username(),
            session = %self.ctx.session_id(),
            discarded,
            "viewer session closed"
        );
    }
}
