use crate::record::{RecordId, Status};
use crate::session::Role;
use crate::state_machine::TransitionError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PretriageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid value for {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("illegal status transition: {0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("record {id} changed since you loaded it (expected {expected}, found {current})")]
    ConcurrencyConflict {
        id: RecordId,
        expected: Status,
        current: Status,
    },
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{operation} did not complete within {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("failed to read table file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write table file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize table: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize table: {0}")]
    Deserialization(serde_json::Error),

    #[error("user already exists: {0}")]
    DuplicateIdentity(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{role} sessions may not {operation}")]
    Forbidden { role: Role, operation: &'static str },

    #[error("a submission is already in flight for this session")]
    SubmitInFlight,
    #[error("viewer session is closed")]
    SessionClosed,
}

impl PretriageError {
    /// Whether the caller may reasonably retry the same operation unchanged.
    ///
    /// Infrastructure failures are retryable; validation failures and lost races are not,
    /// since repeating them would produce the same answer until the caller re-decides.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PretriageError::StoreUnavailable(_)
                | PretriageError::Timeout { .. }
                | PretriageError::FileRead(_)
                | PretriageError::FileWrite(_)
        )
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        PretriageError::StoreUnavailable(format!("{what} lock poisoned"))
    }
}

pub type PretriageResult<T> = std::result::Result<T, PretriageError>;
