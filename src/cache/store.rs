//! Shared cache store - key-value with TTL, counters, and pub/sub.
//!
//! The store is the single shared resource behind both the read-through
//! cache and the event bus transport. Operations are individually atomic
//! at the key level; nothing coordinates across keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::sync::Cache;
use moka::Expiry;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Buffer for each pub/sub channel. Slow subscribers past this lag
/// lose messages (at-most-once delivery).
const CHANNEL_CAPACITY: usize = 256;

/// Shared cache store interface.
///
/// Mirrors the operations the service needs from a networked cache
/// (get/set-with-TTL/delete, counters, publish/subscribe). The
/// in-process implementation below backs tests and single-node runs;
/// every component takes the trait so the backend can be swapped.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value by key. `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value with a per-entry time-to-live.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Delete the given keys. Missing keys are not an error.
    async fn delete(&self, keys: &[&str]) -> Result<(), CacheError>;

    /// Atomically increment a counter, returning the new value.
    async fn increment(&self, key: &str) -> Result<u64, CacheError>;

    /// Publish a payload on a channel. Succeeds even with zero
    /// subscribers (the message is then dropped).
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError>;

    /// Subscribe to a channel, yielding payloads in publish order.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, CacheError>;
}

/// A live pub/sub subscription.
///
/// Wraps a broadcast receiver; messages published before the
/// subscription was created are never delivered.
pub struct Subscription {
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    /// Build a subscription from a raw broadcast receiver.
    pub fn from_receiver(rx: broadcast::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Wait for the next payload.
    ///
    /// Lagged messages are skipped (they were dropped by the transport,
    /// not malformed). Returns `SubscriptionClosed` when the channel is
    /// gone, which the listener treats as a transport disconnect.
    pub async fn next(&mut self) -> Result<String, CacheError> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("subscription lagged, {} message(s) dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(CacheError::SubscriptionClosed);
                }
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Cached value with its own TTL, consumed by the expiry policy.
#[derive(Clone)]
struct CachedValue {
    payload: String,
    ttl: Duration,
}

/// Per-entry expiration: each value carries the TTL it was set with.
struct PerEntryExpiry;

impl Expiry<String, CachedValue> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache store built on Moka.
///
/// Thread-safe and clone-friendly through `Arc`; all producer instances
/// within the process observe the same entries, counters, and channels.
pub struct MemoryCacheStore {
    entries: Cache<String, CachedValue>,
    counters: DashMap<String, AtomicU64>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryCacheStore {
    /// Create an empty cache store.
    pub fn new() -> Self {
        let entries = Cache::builder()
            .max_capacity(10_000)
            .expire_after(PerEntryExpiry)
            .build();

        Self {
            entries,
            counters: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    /// Get or create the broadcast sender for a channel.
    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).map(|v| v.payload))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CachedValue {
                payload: value.to_string(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.invalidate(*key);
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64, CacheError> {
        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        Ok(counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError> {
        let sender = self.sender(channel);

        // send() errors when there are no subscribers; for a broadcast
        // bus that means the message is dropped, not that publish failed
        match sender.send(payload.to_string()) {
            Ok(receivers) => {
                debug!("published to '{}' ({} subscriber(s))", channel, receivers);
            }
            Err(broadcast::error::SendError(_)) => {
                debug!("published to '{}' with no subscribers, dropped", channel);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, CacheError> {
        Ok(Subscription::from_receiver(self.sender(channel).subscribe()))
    }
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("entry_count", &self.entries.entry_count())
            .field("counters", &self.counters.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
