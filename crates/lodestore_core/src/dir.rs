//! Database directory management.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK      # Advisory lock for single-process access
//! └─ wal.log   # Write-ahead log
//! ```
//!
//! The LOCK file ensures only one process opens the database at a time.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{CoreError, CoreResult};

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";

/// Holds the database directory and its exclusive lock.
///
/// The lock is released when the `DatabaseDir` is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory and locks it.
    ///
    /// # Errors
    ///
    /// - The directory is missing and `create_if_missing` is false
    ///   (`InvalidFormat`)
    /// - The path is not a directory (`InvalidFormat`)
    /// - Another process holds the lock (`DatabaseLocked`)
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the WAL file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// True if no WAL has been written yet.
    #[must_use]
    pub fn is_new_database(&self) -> bool {
        fs::metadata(self.wal_path()).map_or(true, |m| m.len() == 0)
    }
}
