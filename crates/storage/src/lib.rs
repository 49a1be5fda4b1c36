#![forbid(unsafe_code)]

pub mod legacy;
pub mod progress_store;
pub mod repository;
pub mod sqlite;

pub use progress_store::{ProgressRow, ProgressStore, StoredProgress};
pub use repository::{InMemoryStore, KeyValueStore, Storage, StorageError, StoreChange, StoreEvent};
