use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::repository::{SlotStore, StorageError};

/// File-backed slot store: one file per slot under a directory.
///
/// Slot `key` lives in `<dir>/<prefix>-<key>`. Writes go through a temporary
/// file and a rename so a crash never leaves a half-written slot behind.
#[derive(Debug, Clone)]
pub struct FileSlots {
    dir: PathBuf,
    prefix: String,
}

fn io_err(e: std::io::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl FileSlots {
    /// Opens (and creates if needed) the slot directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(&self, key: &str) -> String {
        format!("{}-{key}", self.prefix)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(self.file_name(key))
    }
}

impl SlotStore for FileSlots {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let target = self.path(key);
        let tmp = self.dir.join(format!(".{}.tmp", self.file_name(key)));
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &target).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        let owned = format!("{}-", self.prefix);
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&owned) {
                fs::remove_file(entry.path()).map_err(io_err)?;
            }
        }
        Ok(())
    }
}
