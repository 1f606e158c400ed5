//! HTTP API - thin axum layer over the core components.
//!
//! Routing and request shapes live here; all invariants are enforced by
//! the components behind `AppState`. Listing and health endpoints are
//! best-effort: they report degraded indicators instead of failing when
//! only the cache or event pipeline is impaired.

pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::cache::{CacheStore, RecordReader};
use crate::events::ListenerStatus;
use crate::metrics::Metrics;
use crate::notifications::NotificationHistory;
use crate::store::{RecordStore, RecordWriter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Read-through reader for the record set.
    pub reader: Arc<RecordReader>,

    /// Invalidate-on-write record writer.
    pub writer: Arc<RecordWriter>,

    /// Ground-truth record store, pinged by the health endpoint.
    pub store: Arc<dyn RecordStore>,

    /// Shared cache store, probed by the health endpoint.
    pub cache: Arc<dyn CacheStore>,

    /// Bounded notification history.
    pub history: Arc<NotificationHistory>,

    /// Process-wide counters.
    pub metrics: Arc<Metrics>,

    /// Read-only view of the event listener.
    pub listener: ListenerStatus,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route("/notifications", get(handlers::list_notifications))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve the API until the shutdown future resolves.
pub async fn serve(
    addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
