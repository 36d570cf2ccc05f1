//! Credential storage and login.
//!
//! Passwords are never stored. Each user row keeps a random salt and
//! `hex(sha256(salt || password))`.

use crate::constants::PASSWORD_SALT_LEN;
use crate::persist::{lock_table, read_table, write_table};
use crate::session::{Role, SessionContext};
use crate::{PretriageError, PretriageResult};
use chrono::{DateTime, Utc};
use pretriage_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredCredential {
    username: NonEmptyText,
    salt: String,
    digest: String,
    role: Role,
    created_at: DateTime<Utc>,
}

type CredentialTable = BTreeMap<String, StoredCredential>;

#[derive(Debug)]
enum Backing {
    Memory(CredentialTable),
    File(PathBuf),
}

/// Table of user credentials, consulted only for registration and login.
#[derive(Debug)]
pub struct CredentialStore {
    backing: Mutex<Backing>,
}

impl CredentialStore {
    pub fn in_memory() -> Self {
        Self {
            backing: Mutex::new(Backing::Memory(CredentialTable::new())),
        }
    }

    /// Open the JSON table at `path`, creating it on first registration.
    ///
    /// # Errors
    ///
    /// Fails if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> PretriageResult<Self> {
        let path = path.into();
        read_table::<CredentialTable>(&path)?;
        Ok(Self {
            backing: Mutex::new(Backing::File(path)),
        })
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// - [`PretriageError::Validation`] if the username or password is blank,
    /// - [`PretriageError::DuplicateIdentity`] if the username is taken.
    pub fn register(&self, username: &str, password: &str, role: Role) -> PretriageResult<()> {
        let username = NonEmptyText::new(username).map_err(|e| PretriageError::Validation {
            field: "username",
            reason: e.to_string(),
        })?;
        if password.is_empty() {
            return Err(PretriageError::Validation {
                field: "password",
                reason: "password cannot be empty".into(),
            });
        }

        self.with_table(true, |table| {
            if table.contains_key(username.as_str()) {
                return Err(PretriageError::DuplicateIdentity(username.to_string()));
            }
            let salt: [u8; PASSWORD_SALT_LEN] = rand::random();
            table.insert(
                username.as_str().to_owned(),
                StoredCredential {
                    username: username.clone(),
                    salt: hex::encode(salt),
                    digest: digest(&salt, password),
                    role,
                    created_at: Utc::now(),
                },
            );
            Ok(())
        })?;

        tracing::info!(user = %username, %role, "registered user");
        Ok(())
    }

    /// Check a username/password pair and open a session.
    ///
    /// # Errors
    ///
    /// Returns [`PretriageError::InvalidCredentials`] for an unknown user and for a wrong
    /// password alike.
    pub fn login(&self, username: &str, password: &str) -> PretriageResult<SessionContext> {
        let stored = self.with_table(false, |table| Ok(table.get(username.trim()).cloned()))?;
        let Some(stored) = stored else {
            return Err(PretriageError::InvalidCredentials);
        };
        let salt = hex::decode(&stored.salt).map_err(|e| {
            PretriageError::StoreUnavailable(format!("corrupt salt for {}: {e}", stored.username))
        })?;
        if !digests_match(&digest(&salt, password), &stored.digest) {
            tracing::warn!(user = %stored.username, "failed login");
            return Err(PretriageError::InvalidCredentials);
        }
        let ctx = SessionContext::new(stored.username, stored.role);
        tracing::info!(user = %ctx.username(), role = %ctx.role(), session = %ctx.session_id(), "login");
        Ok(ctx)
    }

    fn with_table<R>(
        &self,
        persist: bool,
        f: impl FnOnce(&mut CredentialTable) -> PretriageResult<R>,
    ) -> PretriageResult<R> {
        let mut backing = self
            .backing
            .lock()
            .map_err(|_| PretriageError::poisoned("credential table"))?;
        match &mut *backing {
            Backing::Memory(table) => f(table),
            Backing::File(path) => {
                let _lock = if persist { Some(lock_table(path)?) } else { None };
                let mut table = read_table::<CredentialTable>(path)?.unwrap_or_default();
                let result = f(&mut table)?;
                if persist {
                    write_table(path, &table)?;
                }
                Ok(result)
            }
        }
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison: no early exit on the first differing byte.
fn digests_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |diff, (x, y)| diff | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_then_login() {
        let store = CredentialStore::in_memory();
        store.register("dr.ruiz", "s3cret", Role::Doctor).unwrap();
        let ctx = store.login("dr.ruiz", "s3cret").expect("login should succeed");
        assert_eq!(ctx.role(), Role::Doctor);
        assert_eq!(ctx.username().as_str(), "dr.ruiz");
    }

    #[test]
    fn test_duplicate_username_is_rejected() {
        let store = CredentialStore::in_memory();
        store.register("enf.lopez", "a", Role::Nurse).unwrap();
        let err = store.register(" enf.lopez ", "b", Role::Doctor).unwrap_err();
        assert!(matches!(err, PretriageError::DuplicateIdentity(name) if name == "enf.lopez"));
    }

    #[test]
    fn test_wrong_password_and_unknown_user_look_the_same() {
        let store = CredentialStore::in_memory();
        store.register("dr.ruiz", "s3cret", Role::Doctor).unwrap();
        assert!(matches!(
            store.login("dr.ruiz", "nope"),
            Err(PretriageError::InvalidCredentials)
        ));
        assert!(matches!(
            store.login("dr.nobody", "s3cret"),
            Err(PretriageError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_blank_inputs_are_validation_errors() {
        let store = CredentialStore::in_memory();
        assert!(matches!(
            store.register("  ", "pw", Role::Nurse),
            Err(PretriageError::Validation {
                field: "username",
                ..
            })
        ));
        assert!(matches!(
            store.register("enf.lopez", "", Role::Nurse),
            Err(PretriageError::Validation {
                field: "password",
                ..
            })
        ));
    }

    #[test]
    fn test_same_password_gets_different_digests() {
        let a = digest(&[1; PASSWORD_SALT_LEN], "pw");
        let b = digest(&[2; PASSWORD_SALT_LEN], "pw");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_digest_comparison() {
        let stored = digest(&[7; PASSWORD_SALT_LEN], "s3cret");
        assert!(digests_match(&digest(&[7; PASSWORD_SALT_LEN], "s3cret"), &stored));
        assert!(!digests_match(&digest(&[7; PASSWORD_SALT_LEN], "s3creT"), &stored));
        assert!(!digests_match(&stored[..63], &stored));
    }

    #[test]
    fn test_file_backed_store_persists_without_plaintext() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        CredentialStore::open(&path)
            .unwrap()
            .register("dr.ruiz", "s3cret", Role::Doctor)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("s3cret"));

        let reopened = CredentialStore::open(&path).unwrap();
        assert!(reopened.login("dr.ruiz", "s3cret").is_ok());
    }
}
