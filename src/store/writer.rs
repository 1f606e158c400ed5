//! Write path: store insert, cache invalidation, event publish.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{NewRecord, Record, RecordStore};
use crate::cache::{CacheStore, CACHED_AT_KEY, RECORDS_KEY};
use crate::error::{ValidationError, WriteError};
use crate::events::{DomainEvent, EventBus};

/// Invalidate-on-write record writer.
///
/// Order is fixed: store insert, then cache invalidation, then exactly
/// one `record.created` event. Only the insert can fail the call - a
/// failed invalidation leaves a stale entry for at most its TTL, and a
/// failed publish loses the event (at-most-once delivery). Both are
/// logged and swallowed because the write already committed.
pub struct RecordWriter {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheStore>,
    bus: EventBus,
    service_name: String,
}

impl RecordWriter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        bus: EventBus,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            service_name: service_name.into(),
        }
    }

    /// Create a record and return it with its store-assigned id.
    pub async fn create(&self, new: NewRecord) -> Result<Record, WriteError> {
        validate(&new)?;

        let record = self.store.insert(new).await?;
        debug!("inserted record {} ({})", record.id, record.email);

        // Invalidate, not update-in-place; the next read repopulates
        if let Err(e) = self.cache.delete(&[RECORDS_KEY, CACHED_AT_KEY]).await {
            warn!("cache invalidation failed, entry stale until TTL: {}", e);
        }

        let event = DomainEvent::record_created(&record, &self.service_name);
        if let Err(e) = self.bus.publish(&event).await {
            warn!("event publish failed, write already committed: {}", e);
        }

        Ok(record)
    }
}

/// Field-level checks applied before touching storage.
///
/// The duplicate-email check is NOT here: the store's unique constraint
/// is the authoritative guard.
fn validate(new: &NewRecord) -> Result<(), ValidationError> {
    if new.name.trim().is_empty() {
        return Err(ValidationError("name is required".into()));
    }
    if new.department.trim().is_empty() {
        return Err(ValidationError("department is required".into()));
    }
    let email = new.email.trim();
    if email.is_empty() {
        return Err(ValidationError("email is required".into()));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ValidationError(format!("'{email}' is not a valid email")));
    }
    Ok(())
}
