use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use storage::SlotStore;

use crate::error::StateError;

/// Value kept in a simple-key storage slot.
///
/// Read once at construction; every write serializes the new value into the
/// slot before it becomes visible in memory. Missing, unreadable or corrupt
/// slot data falls back to the default.
pub struct PersistedScalar<T> {
    slots: Arc<dyn SlotStore>,
    key: &'static str,
    value: Mutex<T>,
    changes: watch::Sender<u64>,
}

impl<T> PersistedScalar<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    #[must_use]
    pub fn new(slots: Arc<dyn SlotStore>, key: &'static str, default: T) -> Self {
        let value = match slots.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!(slot = key, error = %err, "corrupt slot data, using default");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                tracing::error!(slot = key, error = %err, "slot unreadable, using default");
                default
            }
        };
        let (changes, _) = watch::channel(0);
        Self {
            slots,
            key,
            value: Mutex::new(value),
            changes,
        }
    }

    #[must_use]
    pub fn key(&self) -> &'static str {
        self.key
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// # Errors
    ///
    /// Returns `StateError` if the value cannot be serialized or written; the
    /// in-memory value is left unchanged in that case.
    pub fn set(&self, value: T) -> Result<(), StateError> {
        let raw =
            serde_json::to_string(&value).map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut guard = self.lock();
        self.slots.set(self.key, &raw)?;
        *guard = value;
        drop(guard);
        self.bump();
        Ok(())
    }

    /// Applies `f` to a copy of the value and stores the result.
    ///
    /// # Errors
    ///
    /// Same as [`PersistedScalar::set`].
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StateError> {
        let mut next = self.get();
        let out = f(&mut next);
        self.set(next)?;
        Ok(out)
    }

    /// Deletes the slot and resets the value to `value` in memory.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the slot cannot be removed.
    pub fn clear_to(&self, value: T) -> Result<(), StateError> {
        let mut guard = self.lock();
        self.slots.remove(self.key)?;
        *guard = value;
        drop(guard);
        self.bump();
        Ok(())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }
}
