//! Event bus - one named pub/sub channel over the shared cache store.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::DomainEvent;
use crate::cache::{CacheStore, Subscription};
use crate::error::CacheError;

/// Errors from publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] CacheError),
}

/// A single logical publish/subscribe channel.
///
/// `publish` is fire-and-forget: it succeeds when the transport accepts
/// the message, whether or not anyone is listening. This is a broadcast
/// bus, not a durable queue.
#[derive(Clone)]
pub struct EventBus {
    cache: Arc<dyn CacheStore>,
    channel: String,
}

impl EventBus {
    pub fn new(cache: Arc<dyn CacheStore>, channel: impl Into<String>) -> Self {
        Self {
            cache,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish an event. Ownership of the event's content transfers to
    /// the bus; there is no acknowledgment back to the producer.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        self.cache.publish(&self.channel, &payload).await?;
        debug!("published {} event {}", event.event_type, event.event_id);
        Ok(())
    }

    /// Subscribe to the channel, yielding raw payloads in publish order.
    pub async fn subscribe(&self) -> Result<Subscription, CacheError> {
        self.cache.subscribe(&self.channel).await
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
