//! JSON table files.
//!
//! Tables are rewritten whole: serialise to a uniquely named temporary file in the same
//! directory, then rename it over the target. Readers therefore see either the previous table
//! or the next one, never a torn write, and do not need a lock.
//!
//! Writers must hold the table's [`TableLock`] across load, mutate and write. The lock is an
//! OS advisory lock on a sibling `<table>.lock` file, so it excludes writers in other handles
//! and other processes (the CLI and the server) alike.

use crate::{PretriageError, PretriageResult};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Exclusive writer lock on one table file. Released on drop.
#[derive(Debug)]
pub(crate) struct TableLock {
    file: File,
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release table lock: {e}");
        }
    }
}

/// Block until this caller is the only writer of the table at `path`.
pub(crate) fn lock_table(path: &Path) -> PretriageResult<TableLock> {
    fs::create_dir_all(table_dir(path)).map_err(PretriageError::FileWrite)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(PretriageError::FileWrite)?;
    file.lock_exclusive().map_err(PretriageError::FileWrite)?;
    Ok(TableLock { file })
}

/// Read a table, returning `None` if the file does not exist yet.
pub(crate) fn read_table<T: DeserializeOwned>(path: &Path) -> PretriageResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PretriageError::FileRead(e)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(PretriageError::Deserialization)
}

/// Replace the table at `path`. Callers hold its [`TableLock`].
pub(crate) fn write_table<T: Serialize>(path: &Path, table: &T) -> PretriageResult<()> {
    let dir = table_dir(path);
    fs::create_dir_all(dir).map_err(PretriageError::FileWrite)?;
    let json = serde_json::to_string_pretty(table).map_err(PretriageError::Serialization)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(PretriageError::FileWrite)?;
    tmp.write_all(json.as_bytes())
        .map_err(PretriageError::FileWrite)?;
    tmp.as_file().sync_all().map_err(PretriageError::FileWrite)?;
    tmp.persist(path)
        .map_err(|e| PretriageError::FileWrite(e.error))?;
    Ok(())
}

fn table_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let table: Option<BTreeMap<String, u32>> =
            read_table(&dir.path().join("absent.json")).expect("read");
        assert!(table.is_none());
    }

    #[test]
    fn test_write_creates_parent_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("table.json");
        let mut table = BTreeMap::new();
        table.insert("a".to_string(), 1u32);

        write_table(&path, &table).expect("write");

        let back: BTreeMap<String, u32> = read_table(&path).expect("read").expect("present");
        assert_eq!(back, table);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("table.json")]);
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.json");

        let held = lock_table(&path).expect("first lock");
        let other = OpenOptions::new()
            .write(true)
            .open(lock_path(&path))
            .expect("lock file exists");
        assert!(other.try_lock_exclusive().is_err());

        drop(held);
        assert!(other.try_lock_exclusive().is_ok());
    }

    #[test]
    fn test_corrupt_file_is_a_deserialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_table::<BTreeMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(err, PretriageError::Deserialization(_)));
    }
}
