//! In-memory record store for tests and local runs.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{NewRecord, Record, RecordStore};
use crate::error::StoreError;

/// Record store backed by process memory.
///
/// Enforces the same email uniqueness as the MongoDB backend so the
/// write path behaves identically against either.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<Record>>,
    next_id: AtomicI64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, new: NewRecord) -> Result<Record, StoreError> {
        let email = new.email.to_lowercase();
        let mut records = self.records.write();

        if records.iter().any(|r| r.email == email) {
            return Err(StoreError::DuplicateEmail(email));
        }

        let record = Record {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            name: new.name,
            email,
            department: new.department,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<Record>, StoreError> {
        // Insertion order is id order, so newest first is the reverse
        Ok(self.records.read().iter().rev().cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
