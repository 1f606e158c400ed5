//! Notification module - processed-event records and their bounded history.

mod history;

pub use history::{NotificationHistory, Page, MAX_PAGE_LIMIT};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::DomainEvent;

/// A processed notification.
///
/// `event_id` is a back-reference to the domain event that produced it;
/// the notification does not own the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Unique per processing, even for redelivered events.
    pub id: Uuid,
    pub notification_type: String,
    pub event_id: Uuid,
    pub recipient_name: String,
    pub recipient_email: String,
    pub status: String,
    pub processed_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Build the welcome notification for a `record.created` event.
    pub fn welcome_for(event: &DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_type: "welcome".to_string(),
            event_id: event.event_id,
            recipient_name: event.record_name.clone(),
            recipient_email: event.record_email.clone(),
            status: "sent".to_string(),
            processed_at: Utc::now(),
        }
    }
}
