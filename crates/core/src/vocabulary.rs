//! Deployment vocabulary.
//!
//! Sites have run with different priority scales and status sets. Neither is hardcoded:
//! the pair is chosen at startup and every edit is checked against it.

use crate::record::{Priority, Status};
use crate::state_machine::StatusFlow;
use crate::{PretriageError, PretriageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority levels a deployment accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityScale {
    /// `Baja`, `Media`, `Alta`, `Inmediata`
    FourLevel,
    /// `Normal`, `Prioritaria`, `Inmediata`
    ThreeLevel,
}

impl PriorityScale {
    pub fn levels(self) -> &'static [Priority] {
        match self {
            PriorityScale::FourLevel => &[
                Priority::Baja,
                Priority::Media,
                Priority::Alta,
                Priority::Inmediata,
            ],
            PriorityScale::ThreeLevel => {
                &[Priority::Normal, Priority::Prioritaria, Priority::Inmediata]
            }
        }
    }

    pub fn contains(self, priority: Priority) -> bool {
        self.levels().contains(&priority)
    }
}

impl fmt::Display for PriorityScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityScale::FourLevel => f.write_str("four-level"),
            PriorityScale::ThreeLevel => f.write_str("three-level"),
        }
    }
}

impl FromStr for PriorityScale {
    type Err = PretriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "four-level" | "4" => Ok(PriorityScale::FourLevel),
            "three-level" | "3" => Ok(PriorityScale::ThreeLevel),
            other => Err(PretriageError::InvalidInput(format!(
                "unknown priority scale '{other}' (expected four-level or three-level)"
            ))),
        }
    }
}

/// The priority scale and status flow in force for a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub priority_scale: PriorityScale,
    pub status_flow: StatusFlow,
}

impl Vocabulary {
    pub fn new(priority_scale: PriorityScale, status_flow: StatusFlow) -> Self {
        Self {
            priority_scale,
            status_flow,
        }
    }

    /// Clearing a priority is always allowed.
    pub fn check_priority(&self, priority: Option<Priority>) -> PretriageResult<()> {
        match priority {
            Some(p) if !self.priority_scale.contains(p) => Err(PretriageError::Validation {
                field: "priority",
                reason: format!("{p} is not on the {} scale", self.priority_scale),
            }),
            _ => Ok(()),
        }
    }

    pub fn check_status(&self, status: Status) -> PretriageResult<()> {
        if self.status_flow.contains(status) {
            Ok(())
        } else {
            Err(PretriageError::Validation {
                field: "status",
                reason: format!("{status} is not part of the {} flow", self.status_flow),
            })
        }
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(PriorityScale::ThreeLevel, StatusFlow::ThreeState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_share_only_inmediata() {
        for p in PriorityScale::FourLevel.levels() {
            let shared = PriorityScale::ThreeLevel.contains(*p);
            assert_eq!(shared, *p == Priority::Inmediata, "{p}");
        }
    }

    #[test]
    fn test_check_priority_against_scale() {
        let vocab = Vocabulary::new(PriorityScale::FourLevel, StatusFlow::TwoState);
        assert!(vocab.check_priority(Some(Priority::Alta)).is_ok());
        assert!(vocab.check_priority(None).is_ok());
        let err = vocab.check_priority(Some(Priority::Prioritaria)).unwrap_err();
        assert!(matches!(
            err,
            PretriageError::Validation {
                field: "priority",
                ..
            }
        ));
    }

    #[test]
    fn test_check_status_against_flow() {
        let vocab = Vocabulary::new(PriorityScale::FourLevel, StatusFlow::TwoState);
        assert!(vocab.check_status(Status::Attended).is_ok());
        assert!(vocab.check_status(Status::InAttention).is_err());
        assert!(Vocabulary::default()
            .check_status(Status::InAttention)
            .is_ok());
    }

    #[test]
    fn test_parse_scale_names() {
        assert_eq!(
            "FOUR-LEVEL".parse::<PriorityScale>().unwrap(),
            PriorityScale::FourLevel
        );
        assert!("five-level".parse::<PriorityScale>().is_err());
    }
}
