//! # Pre-triage Core
//!
//! Core business logic for the hospital pre-triage board.
//!
//! Nurses register patients; doctors watch the shared table, set each patient's priority and
//! status, and submit. Several doctors work the same table at once, so this crate is mostly
//! about keeping their edits from silently overwriting each other:
//! - [`store::RecordStore`]: the single source of truth, with compare-and-set on `status` and
//!   last-writer-wins on `priority`
//! - [`snapshot`]: immutable point-in-time views fetched from the store
//! - [`state_machine`]: legal `status` transitions for the configured flow
//! - [`reconcile`]: per-field diff and write of a viewer's local edits
//! - [`viewer`] and [`scheduler`]: one doctor's session, optionally driven on a timer
//! - [`auth`] and [`intake`]: the collaborators that create sessions and records
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest` and `cli`.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod intake;
pub mod reconcile;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod state_machine;
pub mod store;
pub mod viewer;
pub mod vocabulary;
pub mod working_copy;

mod persist;

pub use auth::CredentialStore;
pub use config::CoreConfig;
pub use error::{PretriageError, PretriageResult};
pub use intake::{IntakeForm, IntakeService};
pub use reconcile::{
    FieldChange, FieldOutcome, PendingEdit, ReconcileReport, Reconciler, RecordOutcome, Rejection,
};
pub use record::{Field, FieldValue, PatientRecord, Priority, RecordId, Sex, Status};
pub use scheduler::{spawn_viewer, ViewerConfig, ViewerEvent, ViewerHandle, ViewerView};
pub use session::{Role, SessionContext};
pub use snapshot::{Snapshot, SnapshotFetcher, SnapshotFilter};
pub use state_machine::{StatusFlow, TransitionError};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore};
pub use viewer::{RefreshSummary, SubmitReport, ViewerSession};
pub use vocabulary::{PriorityScale, Vocabulary};
pub use working_copy::{StaleEdit, WorkingCopy};

pub use pretriage_types::NonEmptyText;
