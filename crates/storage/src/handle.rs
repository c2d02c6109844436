use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::repository::{CollectionStore, InMemorySlots, InMemoryStore, SlotStore, StorageError};

/// Opens the backing collection store on first use.
#[async_trait]
pub trait StoreOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be opened or migrated.
    async fn open(&self) -> Result<Arc<dyn CollectionStore>, StorageError>;
}

/// Shared, lazily opened collection store.
///
/// Every clone refers to the same cell, so the backend is opened at most once
/// per process no matter how many reactive values wait on it. A failed open
/// leaves the cell empty and the next caller retries.
#[derive(Clone)]
pub struct StoreHandle {
    cell: Arc<OnceCell<Arc<dyn CollectionStore>>>,
    opener: Option<Arc<dyn StoreOpener>>,
}

impl StoreHandle {
    /// Handle over an already opened store.
    #[must_use]
    pub fn ready(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(store))),
            opener: None,
        }
    }

    /// Handle that opens the store through `opener` on first access.
    #[must_use]
    pub fn lazy(opener: Arc<dyn StoreOpener>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            opener: Some(opener),
        }
    }

    /// Returns the store, opening it if this is the first call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if opening fails.
    pub async fn open(&self) -> Result<Arc<dyn CollectionStore>, StorageError> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                match &self.opener {
                    Some(opener) => {
                        let store = opener.open().await?;
                        tracing::info!("local store opened");
                        Ok(store)
                    }
                    None => Err(StorageError::Unavailable("no store opener configured".into())),
                }
            })
            .await?;
        Ok(Arc::clone(store))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }
}

/// Aggregates the collection store and the slot store behind trait objects
/// for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub collections: StoreHandle,
    pub slots: Arc<dyn SlotStore>,
}

impl Storage {
    #[must_use]
    pub fn new(collections: StoreHandle, slots: Arc<dyn SlotStore>) -> Self {
        Self { collections, slots }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        let store: Arc<dyn CollectionStore> = Arc::new(InMemoryStore::new());
        Self {
            collections: StoreHandle::ready(store),
            slots: Arc::new(InMemorySlots::new()),
        }
    }

    /// Erases the collection store, then every slot.
    ///
    /// Slots are only cleared once the collection store is gone, so a
    /// blocked deletion leaves everything in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Blocked` if another consumer holds the store,
    /// or any error from opening or clearing.
    pub async fn destroy(&self) -> Result<(), StorageError> {
        let store = self.collections.open().await?;
        if let Err(err) = store.destroy().await {
            tracing::error!(error = %err, "failed to destroy local store");
            return Err(err);
        }
        self.slots.clear()?;
        tracing::warn!("local store and slots destroyed");
        Ok(())
    }
}
