//! Record storage layer
//!
//! The manager only needs a synchronous key → bytes map that is durable once a
//! call returns. Two backends ship with the crate:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                PromiseManager                │
//! └──────────────────────┬───────────────────────┘
//!                        │ put / get / delete / list
//!          ┌─────────────┴─────────────┐
//!   ┌──────▼──────┐             ┌──────▼──────┐
//!   │ SqliteStore │             │ MemoryStore │
//!   │ (WAL, FULL) │             │ (tests)     │
//!   └─────────────┘             └─────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pledge_core::storage::{RecordStore, SqliteStore};
//!
//! # fn example() -> Result<(), pledge_core::StoreError> {
//! let store = SqliteStore::open(".pledge/promises.db")?;
//! println!("{} records", store.list()?.len());
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::PromiseId;

/// Durable key → bytes store keyed by promise id.
///
/// `put` must not return before the bytes would survive process termination,
/// and must replace any previous value atomically.
pub trait RecordStore: Send + Sync {
    fn put(&self, id: &PromiseId, bytes: &[u8]) -> Result<(), StoreError>;

    fn get(&self, id: &PromiseId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove the value for `id`. Deleting an absent key is not an error.
    fn delete(&self, id: &PromiseId) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<PromiseId>, StoreError>;
}
