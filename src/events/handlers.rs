//! Event handlers.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{DomainEvent, EventHandler};
use crate::metrics::Metrics;
use crate::notifications::{NotificationHistory, NotificationRecord};

/// Sends the welcome notification for `record.created` events.
///
/// Delivery is simulated: the notification is recorded in the bounded
/// history and counted. Redelivered event ids simply produce a second
/// history entry; the history invariants do not depend on uniqueness.
pub struct RecordCreatedHandler {
    history: Arc<NotificationHistory>,
    metrics: Arc<Metrics>,
}

impl RecordCreatedHandler {
    pub fn new(history: Arc<NotificationHistory>, metrics: Arc<Metrics>) -> Self {
        Self { history, metrics }
    }
}

#[async_trait]
impl EventHandler for RecordCreatedHandler {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let notification = NotificationRecord::welcome_for(event);
        info!(
            "sending welcome notification to {} <{}>",
            notification.recipient_name, notification.recipient_email
        );

        self.history.append(notification);
        self.metrics.total_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "record-created-notifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;
    use chrono::Utc;

    #[tokio::test]
    async fn test_handler_records_notification() {
        let history = Arc::new(NotificationHistory::new(10));
        let metrics = Arc::new(Metrics::new());
        let handler = RecordCreatedHandler::new(Arc::clone(&history), Arc::clone(&metrics));

        let event = DomainEvent::record_created(
            &Record {
                id: 1,
                name: "Ada".into(),
                email: "ada@example.com".into(),
                department: "Engineering".into(),
                created_at: Utc::now(),
            },
            "rolodex-api",
        );

        handler.handle(&event).await.unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(metrics.snapshot().total_sent, 1);
        let page = history.page(0, 10);
        assert_eq!(page.items[0].event_id, event.event_id);
        assert_eq!(page.items[0].notification_type, "welcome");
    }
}
