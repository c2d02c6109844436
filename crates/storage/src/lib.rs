#![forbid(unsafe_code)]

pub mod handle;
pub mod repository;
pub mod slots;
pub mod sqlite;

pub use handle::{Storage, StoreHandle, StoreOpener};
pub use repository::{
    Collection, CollectionStore, InMemorySlots, InMemoryStore, SlotStore, StorageError, StoreKey,
    StoredRecord, get_json, get_many_json, put_json,
};
pub use slots::FileSlots;
