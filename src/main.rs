//! Rolodex - Record Directory Service
//!
//! A small record store behind a read-through cache, with writes
//! propagated to consumers over an event bus.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `store` - Record storage (MongoDB or in-memory) + write path
//! - `cache` - Shared cache store and read-through reader
//! - `events` - Domain events, bus, and the background listener
//! - `notifications` - Bounded history of processed notifications
//! - `web` - HTTP API (axum)

mod cache;
mod config;
mod error;
mod events;
mod metrics;
mod notifications;
mod store;
mod web;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cache::{MemoryCacheStore, RecordReader};
use config::{Config, StoreBackend};
use events::handlers::RecordCreatedHandler;
use events::{EventBus, EventListener, RECORD_CREATED};
use metrics::Metrics;
use notifications::NotificationHistory;
use store::{MemoryRecordStore, MongoRecordStore, RecordStore, RecordWriter};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // Initialize logging with sensible defaults
    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rolodex=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Rolodex service...");

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded successfully");
    info!("Store backend: {:?}", config.store_backend);

    // Connect the record store
    let record_store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Mongodb => {
            info!("Connecting to MongoDB...");
            let uri = config
                .mongodb_uri
                .clone()
                .ok_or_else(|| anyhow::anyhow!("MONGODB_URI must be set"))?;
            let store = MongoRecordStore::connect(&uri, &config.mongodb_database)
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect record store: {e}"))?;
            info!("Record store connected");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            info!("Using in-memory record store");
            Arc::new(MemoryRecordStore::new())
        }
    };

    // Shared cache store carries both the record-set cache and the bus
    let cache: Arc<MemoryCacheStore> = Arc::new(MemoryCacheStore::new());
    info!("Cache store initialized");

    let bus = EventBus::new(cache.clone(), config.event_channel.clone());
    let metrics = Arc::new(Metrics::new());
    let history = Arc::new(NotificationHistory::new(config.max_history));

    let reader = Arc::new(RecordReader::new(
        record_store.clone(),
        cache.clone(),
        config.cache_ttl,
    ));
    let writer = Arc::new(RecordWriter::new(
        record_store.clone(),
        cache.clone(),
        bus.clone(),
        config.service_name.clone(),
    ));

    // One listener task per process
    let handler = Arc::new(RecordCreatedHandler::new(
        Arc::clone(&history),
        Arc::clone(&metrics),
    ));
    let listener = EventListener::new(
        bus.clone(),
        Arc::clone(&metrics),
        config.listener_max_attempts,
        config.listener_backoff_base,
    )
    .register(RECORD_CREATED, handler)
    .start();
    info!("Event listener started on channel '{}'", config.event_channel);

    let state = web::AppState {
        reader,
        writer,
        store: record_store,
        cache,
        history,
        metrics,
        listener: listener.status(),
    };

    web::serve(&config.bind_addr, state, shutdown_signal()).await?;

    info!("Stopping event listener...");
    listener.stop().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
