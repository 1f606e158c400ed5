//! Record data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned id, unique and monotonic.
    pub id: i64,
    pub name: String,
    /// Unique across the store.
    pub email: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a record that has not been stored yet.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub name: String,
    pub email: String,
    pub department: String,
}

impl NewRecord {
    /// Convenience constructor, mostly for tests.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            department: department.into(),
        }
    }
}
