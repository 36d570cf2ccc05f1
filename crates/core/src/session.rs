//! Explicit session context.
//!
//! A [`SessionContext`] is built at login, passed to every gated operation and dropped at
//! logout. There is no ambient "current user".

use crate::{PretriageError, PretriageResult};
use chrono::{DateTime, Utc};
use pretriage_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What a logged-in user may do.
///
/// Nurses register patients; doctors fetch, edit and reconcile records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(alias = "Enfermero")]
    Nurse,
    Doctor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Nurse => f.write_str("Nurse"),
            Role::Doctor => f.write_str("Doctor"),
        }
    }
}

impl FromStr for Role {
    type Err = PretriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nurse" | "enfermero" | "enfermera" => Ok(Role::Nurse),
            "doctor" => Ok(Role::Doctor),
            other => Err(PretriageError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// Identity and role of one logged-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    session_id: Uuid,
    username: NonEmptyText,
    role: Role,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(username: NonEmptyText, role: Role) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            username,
            role,
            started_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn username(&self) -> &NonEmptyText {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Gate an operation on the session's role.
    ///
    /// # Errors
    ///
    /// Returns [`PretriageError::Forbidden`] if the session holds a different role.
    pub fn require(&self, role: Role, operation: &'static str) -> PretriageResult<()> {
        if self.role == role {
            Ok(())
        } else {
            tracing::warn!(
                user = %self.username,
                role = %self.role,
                operation,
                "operation refused for role"
            );
            Err(PretriageError::Forbidden {
                role: self.role,
                operation,
            })
        }
    }
}
