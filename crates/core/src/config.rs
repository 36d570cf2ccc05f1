//! Core runtime configuration.
//!
//! Resolved once at process startup and passed into services. Nothing in the core reads the
//! environment during request handling; binaries read it and hand the raw values to the
//! `*_from_env_value` helpers below.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_OP_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS, RECORDS_FILENAME,
    USERS_FILENAME,
};
use crate::scheduler::ViewerConfig;
use crate::state_machine::StatusFlow;
use crate::vocabulary::{PriorityScale, Vocabulary};
use crate::{PretriageError, PretriageResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    poll_interval: Duration,
    op_timeout: Duration,
    vocabulary: Vocabulary,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        data_dir: PathBuf,
        poll_interval: Duration,
        op_timeout: Duration,
        vocabulary: Vocabulary,
    ) -> PretriageResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(PretriageError::InvalidInput(
                "data_dir cannot be empty".into(),
            ));
        }
        if poll_interval.is_zero() || op_timeout.is_zero() {
            return Err(PretriageError::InvalidInput(
                "poll interval and operation timeout must be positive".into(),
            ));
        }

        Ok(Self {
            data_dir,
            poll_interval,
            op_timeout,
            vocabulary,
        })
    }

    /// Build from raw environment values, one per setting. Unset values take their default.
    pub fn from_env_values(
        data_dir: Option<String>,
        poll_interval_secs: Option<String>,
        op_timeout_secs: Option<String>,
        priority_scale: Option<String>,
        status_flow: Option<String>,
    ) -> PretriageResult<Self> {
        Self::new(
            data_dir_from_env_value(data_dir),
            seconds_from_env_value(
                "PRETRIAGE_POLL_INTERVAL_SECS",
                poll_interval_secs,
                DEFAULT_POLL_INTERVAL_SECS,
            )?,
            seconds_from_env_value(
                "PRETRIAGE_OP_TIMEOUT_SECS",
                op_timeout_secs,
                DEFAULT_OP_TIMEOUT_SECS,
            )?,
            vocabulary_from_env_value(priority_scale, status_flow)?,
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(RECORDS_FILENAME)
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILENAME)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.vocabulary
    }

    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            poll_interval: self.poll_interval,
            op_timeout: self.op_timeout,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            op_timeout: Duration::from_secs(DEFAULT_OP_TIMEOUT_SECS),
            vocabulary: Vocabulary::default(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the data directory from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_DATA_DIR`].
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()))
}

/// Parse a whole number of seconds, falling back to `default_secs` when unset.
pub fn seconds_from_env_value(
    name: &str,
    value: Option<String>,
    default_secs: u64,
) -> PretriageResult<Duration> {
    let secs = match non_blank(value) {
        None => default_secs,
        Some(v) => v.parse::<u64>().map_err(|_| {
            PretriageError::InvalidInput(format!("{name} must be a whole number of seconds, got '{v}'"))
        })?,
    };
    if secs == 0 {
        return Err(PretriageError::InvalidInput(format!("{name} must be positive")));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse the deployment vocabulary. Unset halves take the default.
pub fn vocabulary_from_env_value(
    priority_scale: Option<String>,
    status_flow: Option<String>,
) -> PretriageResult<Vocabulary> {
    let defaults = Vocabulary::default();
    let priority_scale = non_blank(priority_scale)
        .map(|v| PriorityScale::from_str(&v))
        .transpose()?
        .unwrap_or(defaults.priority_scale);
    let status_flow = non_blank(status_flow)
        .map(|v| StatusFlow::from_str(&v))
        .transpose()?
        .unwrap_or(defaults.status_flow);
    Ok(Vocabulary::new(priority_scale, status_flow))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(data_dir_from_env_value(None), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(
            data_dir_from_env_value(Some("  ".into())),
            PathBuf::from(DEFAULT_DATA_DIR)
        );
        assert_eq!(
            seconds_from_env_value("PRETRIAGE_POLL_INTERVAL_SECS", None, 10).unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(
            vocabulary_from_env_value(None, None).unwrap(),
            Vocabulary::default()
        );
    }

    #[test]
    fn test_seconds_must_be_positive_integers() {
        assert!(seconds_from_env_value("X", Some("abc".into()), 5).is_err());
        assert!(seconds_from_env_value("X", Some("0".into()), 5).is_err());
        assert_eq!(
            seconds_from_env_value("X", Some(" 3 ".into()), 5).unwrap(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_vocabulary_halves_are_independent() {
        let vocab = vocabulary_from_env_value(Some("four-level".into()), None).unwrap();
        assert_eq!(vocab.priority_scale, PriorityScale::FourLevel);
        assert_eq!(vocab.status_flow, Vocabulary::default().status_flow);

        let vocab = vocabulary_from_env_value(None, Some("two-state".into())).unwrap();
        assert_eq!(vocab.status_flow, StatusFlow::TwoState);

        assert!(vocabulary_from_env_value(Some("five-level".into()), None).is_err());
    }

    #[test]
    fn test_config_paths_live_under_data_dir() {
        let cfg = CoreConfig::new(
            PathBuf::from("/srv/triage"),
            Duration::from_secs(10),
            Duration::from_secs(5),
            Vocabulary::default(),
        )
        .unwrap();
        assert_eq!(cfg.records_path(), PathBuf::from("/srv/triage/records.json"));
        assert_eq!(cfg.users_path(), PathBuf::from("/srv/triage/users.json"));
        assert_eq!(cfg.viewer_config().op_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(CoreConfig::new(
            PathBuf::from("data"),
            Duration::from_secs(10),
            Duration::ZERO,
            Vocabulary::default(),
        )
        .is_err());
    }
}
