//! Constants used throughout the pre-triage core crate.
//!
//! File names and defaults live here so the stores, the config resolver and the binaries agree.

/// Default directory for the record and credential tables when none is configured.
pub const DEFAULT_DATA_DIR: &str = "pretriage_data";

/// Filename of the patient record table.
pub const RECORDS_FILENAME: &str = "records.json";

/// Filename of the user credential table.
pub const USERS_FILENAME: &str = "users.json";

/// Default viewer refresh interval, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default bound on a single fetch or write, in seconds.
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 5;

/// Length in bytes of the random salt stored with each password digest.
pub const PASSWORD_SALT_LEN: usize = 16;

/// Upper bound on a patient's age accepted at intake.
pub const MAX_PATIENT_AGE: u32 = 120;
