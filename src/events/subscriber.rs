//! Background event listener.
//!
//! Exactly one listener task runs per process. It subscribes to the
//! event bus, decodes each message, and dispatches it to the handler
//! registered for its event type. Connection loss triggers reconnect
//! with exponential backoff; exhausting the attempt budget leaves the
//! listener degraded (visible in health) without taking the process
//! down. The task is supervised: `start` returns a handle with an
//! explicit stop, there is no detached daemon.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DomainEvent, EventBus, EventHandler};
use crate::cache::Subscription;
use crate::metrics::Metrics;

/// Listener lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Listening,
    /// Retry budget exhausted; the listener gave up but the process
    /// keeps serving reads and writes.
    Degraded,
    Stopped,
}

/// Counters maintained by the listener task.
#[derive(Debug, Clone, Default)]
pub struct ListenerStats {
    pub events_received: u64,
    pub decode_errors: u64,
    pub connect_errors: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

enum ConnectOutcome {
    Connected(Subscription),
    Degraded,
    Stopped,
}

/// Builder for the listener task.
pub struct EventListener {
    bus: EventBus,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    metrics: Arc<Metrics>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl EventListener {
    pub fn new(
        bus: EventBus,
        metrics: Arc<Metrics>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            bus,
            handlers: HashMap::new(),
            metrics,
            max_attempts,
            backoff_base,
        }
    }

    /// Register a handler for an event type.
    pub fn register(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(event_type.into(), handler);
        self
    }

    /// Spawn the listener task and return its handle.
    pub fn start(self) -> ListenerHandle {
        let state = Arc::new(RwLock::new(ListenerState::Disconnected));
        let stats = Arc::new(RwLock::new(ListenerStats::default()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = ListenerTask {
            bus: self.bus,
            handlers: self.handlers,
            metrics: self.metrics,
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
            state: Arc::clone(&state),
            stats: Arc::clone(&stats),
        };
        let join = tokio::spawn(task.run(stop_rx));

        ListenerHandle {
            state,
            stats,
            stop: stop_tx,
            task: join,
        }
    }
}

/// Handle to the running listener task.
pub struct ListenerHandle {
    state: Arc<RwLock<ListenerState>>,
    stats: Arc<RwLock<ListenerStats>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ListenerState::Listening
    }

    /// Cloneable read-only view for health reporting.
    pub fn status(&self) -> ListenerStatus {
        ListenerStatus {
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Graceful stop: the in-flight message finishes processing, then
    /// the loop exits with `Stopped`.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!("listener task failed to join: {}", e);
        }
    }
}

/// Read-only view of the listener's state and counters.
#[derive(Clone)]
pub struct ListenerStatus {
    state: Arc<RwLock<ListenerState>>,
    stats: Arc<RwLock<ListenerStats>>,
}

impl ListenerStatus {
    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ListenerState::Listening
    }
}

struct ListenerTask {
    bus: EventBus,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    metrics: Arc<Metrics>,
    max_attempts: u32,
    backoff_base: Duration,
    state: Arc<RwLock<ListenerState>>,
    stats: Arc<RwLock<ListenerStats>>,
}

impl ListenerTask {
    fn set_state(&self, next: ListenerState) {
        *self.state.write() = next;
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("event listener starting on channel '{}'", self.bus.channel());

        loop {
            let mut sub = match self.connect(&mut stop).await {
                ConnectOutcome::Connected(sub) => sub,
                ConnectOutcome::Degraded => {
                    self.set_state(ListenerState::Degraded);
                    error!(
                        "event listener degraded after {} failed connect attempt(s)",
                        self.max_attempts
                    );
                    return;
                }
                ConnectOutcome::Stopped => {
                    self.set_state(ListenerState::Stopped);
                    info!("event listener stopped");
                    return;
                }
            };

            self.set_state(ListenerState::Listening);
            info!("listening on channel '{}'", self.bus.channel());

            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        self.set_state(ListenerState::Stopped);
                        info!("event listener stopped");
                        return;
                    }
                    msg = sub.next() => match msg {
                        Ok(payload) => self.process(&payload).await,
                        Err(e) => {
                            warn!("event transport lost, reconnecting: {}", e);
                            self.set_state(ListenerState::Disconnected);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Try to subscribe, backing off exponentially between attempts.
    async fn connect(&self, stop: &mut watch::Receiver<bool>) -> ConnectOutcome {
        for attempt in 0..self.max_attempts {
            if *stop.borrow() {
                return ConnectOutcome::Stopped;
            }

            self.set_state(ListenerState::Connecting);
            match self.bus.subscribe().await {
                Ok(sub) => return ConnectOutcome::Connected(sub),
                Err(e) => {
                    self.stats.write().connect_errors += 1;
                    let delay = backoff_delay(self.backoff_base, attempt);
                    warn!(
                        "connect attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );

                    tokio::select! {
                        _ = stop.changed() => return ConnectOutcome::Stopped,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        ConnectOutcome::Degraded
    }

    /// Decode and dispatch one message. Never fails the loop: malformed
    /// payloads, unknown event types, and handler errors are logged and
    /// skipped.
    async fn process(&self, payload: &str) {
        let event: DomainEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.write().decode_errors += 1;
                warn!("skipping malformed event payload: {}", e);
                return;
            }
        };

        {
            let mut stats = self.stats.write();
            stats.events_received += 1;
            stats.last_event_at = Some(Utc::now());
        }

        let Some(handler) = self.handlers.get(event.event_type.as_str()) else {
            warn!("no handler for event type '{}', skipping", event.event_type);
            return;
        };

        match handler.handle(&event).await {
            Ok(()) => {
                self.metrics.processed_events.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "handler '{}' processed event {}",
                    handler.name(),
                    event.event_id
                );
            }
            Err(e) => {
                error!(
                    "handler '{}' failed for event {}: {}",
                    handler.name(),
                    event.event_id,
                    e
                );
            }
        }
    }
}

/// Largest exponent applied to the backoff base. Beyond this the delay
/// is far past any useful retry interval, so it stops doubling.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Delay before the next connect attempt: base doubled per attempt,
/// clamped so a large configured attempt count cannot overflow.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.min(MAX_BACKOFF_EXPONENT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::error::CacheError;
    use crate::events::handlers::RecordCreatedHandler;
    use crate::events::RECORD_CREATED;
    use crate::notifications::NotificationHistory;
    use crate::store::Record;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::broadcast;

    fn sample_event() -> DomainEvent {
        DomainEvent::record_created(
            &Record {
                id: 1,
                name: "Ada".into(),
                email: "ada@example.com".into(),
                department: "Engineering".into(),
                created_at: Utc::now(),
            },
            "rolodex-api",
        )
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    struct Fixture {
        cache: Arc<MemoryCacheStore>,
        bus: EventBus,
        metrics: Arc<Metrics>,
        history: Arc<NotificationHistory>,
        handle: ListenerHandle,
    }

    async fn start_fixture() -> Fixture {
        let cache = Arc::new(MemoryCacheStore::new());
        let bus = EventBus::new(cache.clone(), "records:events");
        let metrics = Arc::new(Metrics::new());
        let history = Arc::new(NotificationHistory::new(100));

        let handler = Arc::new(RecordCreatedHandler::new(
            Arc::clone(&history),
            Arc::clone(&metrics),
        ));
        let handle = EventListener::new(
            bus.clone(),
            Arc::clone(&metrics),
            3,
            Duration::from_millis(10),
        )
        .register(RECORD_CREATED, handler)
        .start();

        let fixture = Fixture {
            cache,
            bus,
            metrics,
            history,
            handle,
        };
        let status = fixture.handle.status();
        wait_for(move || status.is_active()).await;
        fixture
    }

    #[test]
    fn test_backoff_delay_doubles_then_clamps() {
        let base = Duration::from_millis(500);

        assert_eq!(backoff_delay(base, 0), base);
        assert_eq!(backoff_delay(base, 3), base * 8);

        // Attempt counts past the exponent cap stop doubling instead of
        // overflowing the multiplication
        assert_eq!(backoff_delay(base, 64), backoff_delay(base, MAX_BACKOFF_EXPONENT));
        assert_eq!(backoff_delay(Duration::MAX, u32::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn test_published_event_reaches_history() {
        let fixture = start_fixture().await;

        fixture.bus.publish(&sample_event()).await.unwrap();

        let history = Arc::clone(&fixture.history);
        wait_for(move || history.len() == 1).await;

        assert_eq!(fixture.metrics.snapshot().processed_events, 1);
        assert_eq!(fixture.metrics.snapshot().total_sent, 1);
        let page = fixture.history.page(0, 10);
        assert_eq!(page.items[0].recipient_email, "ada@example.com");
        assert_eq!(page.items[0].status, "sent");

        fixture.handle.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let fixture = start_fixture().await;

        fixture
            .cache
            .publish("records:events", "this is not json")
            .await
            .unwrap();
        fixture.bus.publish(&sample_event()).await.unwrap();

        // The message after the malformed one is still processed
        let history = Arc::clone(&fixture.history);
        wait_for(move || history.len() == 1).await;
        assert_eq!(fixture.handle.stats().decode_errors, 1);
        assert!(fixture.handle.is_active());

        fixture.handle.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_skipped() {
        let fixture = start_fixture().await;

        let mut unknown = sample_event();
        unknown.event_type = "record.deleted".to_string();
        fixture.bus.publish(&unknown).await.unwrap();
        fixture.bus.publish(&sample_event()).await.unwrap();

        let history = Arc::clone(&fixture.history);
        wait_for(move || history.len() == 1).await;
        assert_eq!(fixture.handle.stats().events_received, 2);
        assert_eq!(fixture.metrics.snapshot().processed_events, 1);

        fixture.handle.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_event_id_appends_twice() {
        let fixture = start_fixture().await;

        let event = sample_event();
        fixture.bus.publish(&event).await.unwrap();
        fixture.bus.publish(&event).await.unwrap();

        let history = Arc::clone(&fixture.history);
        wait_for(move || history.len() == 2).await;

        let page = fixture.history.page(0, 10);
        assert_eq!(page.items[0].event_id, page.items[1].event_id);
        assert_ne!(page.items[0].id, page.items[1].id);

        fixture.handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_terminal() {
        let fixture = start_fixture().await;
        let status = fixture.handle.status();

        fixture.handle.stop().await;
        assert_eq!(status.state(), ListenerState::Stopped);
    }

    /// Cache double whose subscribe fails a configured number of times.
    struct FlakyCacheStore {
        inner: MemoryCacheStore,
        failures_left: AtomicU32,
    }

    impl FlakyCacheStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryCacheStore::new(),
                failures_left: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl CacheStore for FlakyCacheStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set_with_ttl(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<(), CacheError> {
            self.inner.set_with_ttl(key, value, ttl).await
        }

        async fn delete(&self, keys: &[&str]) -> Result<(), CacheError> {
            self.inner.delete(keys).await
        }

        async fn increment(&self, key: &str) -> Result<u64, CacheError> {
            self.inner.increment(key).await
        }

        async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError> {
            self.inner.publish(channel, payload).await
        }

        async fn subscribe(&self, channel: &str) -> Result<Subscription, CacheError> {
            let left = self.failures_left.load(Ordering::Relaxed);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::Relaxed);
                return Err(CacheError::Unavailable("connection refused".into()));
            }
            self.inner.subscribe(channel).await
        }
    }

    #[tokio::test]
    async fn test_reconnects_once_bus_is_reachable() {
        let cache = Arc::new(FlakyCacheStore::failing(2));
        let bus = EventBus::new(cache, "records:events");
        let metrics = Arc::new(Metrics::new());

        let handle =
            EventListener::new(bus, metrics, 3, Duration::from_millis(5)).start();

        let status = handle.status();
        wait_for(move || status.is_active()).await;
        assert_eq!(handle.stats().connect_errors, 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_degraded_after_exhausting_attempts() {
        let cache = Arc::new(FlakyCacheStore::failing(u32::MAX));
        let bus = EventBus::new(cache, "records:events");
        let metrics = Arc::new(Metrics::new());

        let handle =
            EventListener::new(bus, metrics, 3, Duration::from_millis(1)).start();

        let status = handle.status();
        wait_for(move || status.state() == ListenerState::Degraded).await;
        assert_eq!(handle.stats().connect_errors, 3);

        handle.stop().await;
    }

    /// Cache double whose pub/sub channel can be torn down mid-listen.
    struct ResettableCacheStore {
        tx: Mutex<broadcast::Sender<String>>,
    }

    impl ResettableCacheStore {
        fn new() -> Self {
            Self {
                tx: Mutex::new(broadcast::channel(16).0),
            }
        }

        /// Drop the current channel; live subscriptions observe a close.
        fn reset_channel(&self) {
            *self.tx.lock() = broadcast::channel(16).0;
        }
    }

    #[async_trait]
    impl CacheStore for ResettableCacheStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set_with_ttl(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete(&self, _keys: &[&str]) -> Result<(), CacheError> {
            Ok(())
        }

        async fn increment(&self, _key: &str) -> Result<u64, CacheError> {
            Ok(1)
        }

        async fn publish(&self, _channel: &str, payload: &str) -> Result<(), CacheError> {
            let _ = self.tx.lock().send(payload.to_string());
            Ok(())
        }

        async fn subscribe(&self, _channel: &str) -> Result<Subscription, CacheError> {
            Ok(Subscription::from_receiver(self.tx.lock().subscribe()))
        }
    }

    #[tokio::test]
    async fn test_transport_loss_triggers_reconnect() {
        let cache = Arc::new(ResettableCacheStore::new());
        let bus = EventBus::new(cache.clone(), "records:events");
        let metrics = Arc::new(Metrics::new());
        let history = Arc::new(NotificationHistory::new(100));

        let handler = Arc::new(RecordCreatedHandler::new(
            Arc::clone(&history),
            Arc::clone(&metrics),
        ));
        let handle = EventListener::new(
            bus.clone(),
            Arc::clone(&metrics),
            3,
            Duration::from_millis(5),
        )
        .register(RECORD_CREATED, handler)
        .start();

        let status = handle.status();
        wait_for(move || status.is_active()).await;

        // Tear the transport down; the listener must come back on its own
        cache.reset_channel();

        let status = handle.status();
        wait_for(move || status.is_active()).await;

        // Keep publishing until one lands on the re-established
        // subscription (messages sent before it is live are dropped)
        for _ in 0..200 {
            bus.publish(&sample_event()).await.unwrap();
            if !history.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!history.is_empty());

        handle.stop().await;
    }
}
