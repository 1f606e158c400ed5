//! Event system - domain events, bus, and the background listener.
//!
//! Add new event handlers by:
//! 1. Implementing `EventHandler` in `handlers.rs`
//! 2. Registering it on the `EventListener` for its event type
//!
//! Delivery is at-most-once: events published with no live subscriber
//! are dropped, and there is no redelivery on failure.

mod bus;
pub mod handlers;
mod subscriber;

pub use bus::{EventBus, PublishError};
pub use subscriber::{EventListener, ListenerHandle, ListenerState, ListenerStats, ListenerStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Record;

/// Event type emitted when a record is created.
pub const RECORD_CREATED: &str = "record.created";

/// A domain event as carried on the wire (JSON).
///
/// Immutable once published. `event_id` is a v4 UUID so producer
/// retries that re-emit an event stay distinguishable from new events
/// without relying on timestamp formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: String,
    pub event_id: Uuid,
    pub record_id: i64,
    pub record_name: String,
    pub record_email: String,
    pub department: String,
    pub timestamp: DateTime<Utc>,
    pub source_service: String,
}

impl DomainEvent {
    /// Build a `record.created` event for a freshly stored record.
    pub fn record_created(record: &Record, source_service: &str) -> Self {
        Self {
            event_type: RECORD_CREATED.to_string(),
            event_id: Uuid::new_v4(),
            record_id: record.id,
            record_name: record.name.clone(),
            record_email: record.email.clone(),
            department: record.department.clone(),
            timestamp: Utc::now(),
            source_service: source_service.to_string(),
        }
    }
}

/// Handler for a decoded domain event.
///
/// Handlers must tolerate redelivery of the same `event_id`: the bus
/// guarantees at most one delivery per publish, but a producer retry
/// can emit a duplicate id.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}
