//! Status transition rules.
//!
//! Status moves forward only: `Pendiente -> En Atención -> Atendido`. Skipping ahead is
//! allowed (two-state deployments go straight from `Pendiente` to `Atendido`), staying put is
//! allowed, going back is not. `Atendido` is terminal.
//!
//! Validation always runs against the status held by the store at write time, never against
//! a viewer's snapshot.

use crate::record::Status;
use crate::PretriageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Set of statuses a deployment exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFlow {
    /// `Pendiente`, `Atendido`
    TwoState,
    /// `Pendiente`, `En Atención`, `Atendido`
    ThreeState,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("status {status} is not part of the {flow} flow")]
    NotInFlow { status: Status, flow: StatusFlow },
    #[error("cannot move back from {from} to {to}")]
    Backward { from: Status, to: Status },
}

impl StatusFlow {
    pub fn states(self) -> &'static [Status] {
        match self {
            StatusFlow::TwoState => &[Status::Pending, Status::Attended],
            StatusFlow::ThreeState => &[Status::Pending, Status::InAttention, Status::Attended],
        }
    }

    pub fn contains(self, status: Status) -> bool {
        self.states().contains(&status)
    }

    /// Check that `to` is reachable from `from`.
    ///
    /// `from` is not required to be in the flow: a record written under a richer vocabulary
    /// can still advance under a narrower one.
    pub fn validate_transition(self, from: Status, to: Status) -> Result<(), TransitionError> {
        if !self.contains(to) {
            return Err(TransitionError::NotInFlow {
                status: to,
                flow: self,
            });
        }
        if to < from {
            return Err(TransitionError::Backward { from, to });
        }
        Ok(())
    }
}

impl fmt::Display for StatusFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFlow::TwoState => f.write_str("two-state"),
            StatusFlow::ThreeState => f.write_str("three-state"),
        }
    }
}

impl FromStr for StatusFlow {
    type Err = PretriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "two-state" | "2" => Ok(StatusFlow::TwoState),
            "three-state" | "3" => Ok(StatusFlow::ThreeState),
            other => Err(PretriageError::InvalidInput(format!(
                "unknown status flow '{other}' (expected two-state or three-state)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    #[test]
    fn test_forward_steps_are_accepted() {
        let flow = StatusFlow::ThreeState;
        assert!(flow.validate_transition(Pending, InAttention).is_ok());
        assert!(flow.validate_transition(InAttention, Attended).is_ok());
    }

    #[test]
    fn test_skip_to_attended_is_accepted() {
        assert!(StatusFlow::ThreeState
            .validate_transition(Pending, Attended)
            .is_ok());
        assert!(StatusFlow::TwoState
            .validate_transition(Pending, Attended)
            .is_ok());
    }

    #[test]
    fn test_staying_put_is_accepted() {
        assert!(StatusFlow::ThreeState
            .validate_transition(Attended, Attended)
            .is_ok());
    }

    #[test]
    fn test_backward_is_rejected() {
        let err = StatusFlow::ThreeState
            .validate_transition(Attended, Pending)
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Backward {
                from: Attended,
                to: Pending
            }
        );
        assert!(StatusFlow::ThreeState
            .validate_transition(InAttention, Pending)
            .is_err());
    }

    #[test]
    fn test_two_state_flow_rejects_in_attention() {
        let err = StatusFlow::TwoState
            .validate_transition(Pending, InAttention)
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotInFlow { .. }));
    }

    #[test]
    fn test_two_state_flow_advances_legacy_in_attention() {
        assert!(StatusFlow::TwoState
            .validate_transition(InAttention, Attended)
            .is_ok());
    }

    #[test]
    fn test_parse_flow_names() {
        assert_eq!(
            "three-state".parse::<StatusFlow>().unwrap(),
            StatusFlow::ThreeState
        );
        assert_eq!(
            "Two-State".parse::<StatusFlow>().unwrap(),
            StatusFlow::TwoState
        );
        assert!("linear".parse::<StatusFlow>().is_err());
    }
}
