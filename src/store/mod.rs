//! Record store module - ground truth for records.
//!
//! The store owns record data; the cache only ever holds snapshots of
//! it. Two backends implement the same trait: MongoDB for production
//! and an in-memory store for tests and local runs.

mod memory;
mod model;
mod mongo;
mod writer;

pub use memory::MemoryRecordStore;
pub use model::{NewRecord, Record};
pub use mongo::MongoRecordStore;
pub use writer::RecordWriter;

use async_trait::async_trait;

use crate::error::StoreError;

/// Durable storage of records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, assigning its id and creation timestamp.
    ///
    /// The store-level unique constraint on email is the authoritative
    /// duplicate guard; fails with `StoreError::DuplicateEmail`.
    async fn insert(&self, new: NewRecord) -> Result<Record, StoreError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<Record>, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Verify the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
