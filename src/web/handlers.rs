//! Request handlers.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::cache::Source;
use crate::error::{StoreError, WriteError};
use crate::metrics::MetricsSnapshot;
use crate::notifications::{NotificationRecord, MAX_PAGE_LIMIT};
use crate::store::{NewRecord, Record};

/// TTL for the cache health probe entry.
const PROBE_TTL: Duration = Duration::from_secs(10);
const PROBE_KEY: &str = "health:probe";

/// Error response with the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Validation(v) => Self {
                status: StatusCode::BAD_REQUEST,
                message: v.to_string(),
            },
            WriteError::Store(s) => s.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail(_) => Self {
                status: StatusCode::CONFLICT,
                message: e.to_string(),
            },
            StoreError::Backend(_) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: e.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub data: Vec<Record>,
    pub count: usize,
    /// Where this read was served from (`cache` or `store`).
    pub source: Source,
}

/// `GET /records`
pub async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let (records, source) = state.reader.read().await?;
    Ok(Json(RecordsResponse {
        count: records.len(),
        data: records,
        source,
    }))
}

/// `POST /records`
pub async fn create_record(
    State(state): State<AppState>,
    Json(new): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let record = state.writer.create(new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    /// Currently stored entries (post-eviction), not the lifetime total.
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationMetrics {
    pub total_notifications: u64,
    pub total_sent: u64,
    pub processed_events: u64,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub data: Vec<NotificationRecord>,
    pub pagination: Pagination,
    pub metrics: NotificationMetrics,
}

/// `GET /notifications?limit=&offset=`
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Json<NotificationsResponse> {
    let limit = params.limit.min(MAX_PAGE_LIMIT);
    let page = state.history.page(params.offset, limit);
    let MetricsSnapshot {
        processed_events,
        total_sent,
    } = state.metrics.snapshot();

    Json(NotificationsResponse {
        data: page.items,
        pagination: Pagination {
            limit,
            offset: params.offset,
            total: page.total,
            has_more: page.has_more,
        },
        metrics: NotificationMetrics {
            total_notifications: state.history.lifetime_total(),
            total_sent,
            processed_events,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when every dependency reports healthy, otherwise `degraded`.
    pub status: &'static str,
    pub store: &'static str,
    pub cache: &'static str,
    pub event_listener: &'static str,
    pub counters: NotificationMetrics,
}

/// `GET /health`
///
/// Always returns 200 with per-dependency indicators; orchestration
/// reads the body, not the status code.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };
    let cache = probe_cache(&state).await;
    let listener_active = state.listener.is_active();
    let event_listener = if listener_active { "active" } else { "inactive" };

    let status = if store == "healthy" && cache == "healthy" && listener_active {
        "ok"
    } else {
        "degraded"
    };

    let MetricsSnapshot {
        processed_events,
        total_sent,
    } = state.metrics.snapshot();

    Json(HealthResponse {
        status,
        store,
        cache,
        event_listener,
        counters: NotificationMetrics {
            total_notifications: state.history.lifetime_total(),
            total_sent,
            processed_events,
        },
    })
}

/// Round-trip a probe key through the cache.
async fn probe_cache(state: &AppState) -> &'static str {
    if state
        .cache
        .set_with_ttl(PROBE_KEY, "ok", PROBE_TTL)
        .await
        .is_err()
    {
        return "unavailable";
    }

    match state.cache.get(PROBE_KEY).await {
        Ok(Some(v)) if v == "ok" => "healthy",
        Ok(_) => "unhealthy",
        Err(_) => "unavailable",
    }
}
