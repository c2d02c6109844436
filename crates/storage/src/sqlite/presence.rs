//! Advisory lock file next to an on-disk store.
//!
//! Every open repository holds a shared lock on `<db>-lock`. Deleting the
//! store needs the exclusive lock, so it fails while any other consumer,
//! in this process or another, still has the store open.

use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::repository::StorageError;

#[derive(Clone, Debug, Default)]
pub(crate) struct Presence {
    file: Arc<Mutex<Option<File>>>,
}

pub(crate) fn lock_path(db: &Path) -> PathBuf {
    let mut path = db.as_os_str().to_owned();
    path.push("-lock");
    PathBuf::from(path)
}

impl Presence {
    /// Registers a consumer of the store at `db`.
    ///
    /// # Errors
    ///
    /// Returns an error of kind `WouldBlock` if the store is being deleted.
    pub(crate) fn join(db: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(db))?;
        file.try_lock_shared()?;
        Ok(Self {
            file: Arc::new(Mutex::new(Some(file))),
        })
    }

    /// Upgrades to sole ownership of the store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Blocked` while another consumer holds the store;
    /// the shared lock is kept in that case.
    pub(crate) async fn claim(&self) -> Result<(), StorageError> {
        let guard = self.file.lock().await;
        let Some(file) = guard.as_ref() else {
            return Ok(());
        };

        file.unlock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match file.try_lock() {
            Ok(()) => Ok(()),
            Err(TryLockError::WouldBlock) => {
                let _ = file.try_lock_shared();
                Err(StorageError::Blocked(
                    "database is open in another consumer, close it and retry".into(),
                ))
            }
            Err(TryLockError::Error(e)) => {
                let _ = file.try_lock_shared();
                Err(StorageError::Connection(e.to_string()))
            }
        }
    }

    /// Drops back to a shared lock after a failed deletion.
    pub(crate) async fn unclaim(&self) {
        let guard = self.file.lock().await;
        if let Some(file) = guard.as_ref() {
            let _ = file.unlock();
            let _ = file.try_lock_shared();
        }
    }

    /// Releases the lock for good.
    pub(crate) async fn leave(&self) {
        self.file.lock().await.take();
    }
}
