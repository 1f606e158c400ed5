//! Configuration module for the Rolodex service.
//!
//! Loads configuration from environment variables.

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Record store backend selection
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Memory,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Mongodb
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // HTTP
    pub bind_addr: String,

    /// Store backend (mongodb for production, memory for local runs).
    pub store_backend: StoreBackend,

    // MongoDB
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    // Cache
    /// TTL applied to the record-set cache entry.
    pub cache_ttl: Duration,

    // Eventing
    /// Pub/sub channel carrying domain events.
    pub event_channel: String,
    /// Value stamped into the `source_service` field of published events.
    pub service_name: String,
    /// Max connect attempts per reconnect cycle before reporting degraded.
    pub listener_max_attempts: u32,
    /// Base delay for exponential backoff between connect attempts.
    pub listener_backoff_base: Duration,

    // Notifications
    /// Capacity of the bounded notification history.
    pub max_history: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if required environment variables are not set
    /// (`MONGODB_URI` when the backend is mongodb).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let store_backend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "mongodb".to_string())
            .to_lowercase();

        let store_backend = match store_backend.as_str() {
            "memory" => StoreBackend::Memory,
            _ => StoreBackend::Mongodb,
        };

        let mongodb_uri = env::var("MONGODB_URI").ok();

        // Validate the URI is set if the backend is mongodb
        if store_backend == StoreBackend::Mongodb && mongodb_uri.is_none() {
            panic!("MONGODB_URI must be set when STORE_BACKEND is mongodb");
        }

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            store_backend,
            mongodb_uri,
            mongodb_database: env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| "rolodex".to_string()),
            cache_ttl: Duration::from_secs(parse_or("CACHE_TTL_SECS", 300)),
            event_channel: env::var("EVENT_CHANNEL")
                .unwrap_or_else(|_| "records:events".to_string()),
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "rolodex-api".to_string()),
            listener_max_attempts: parse_or("LISTENER_MAX_ATTEMPTS", 3),
            listener_backoff_base: Duration::from_millis(parse_or(
                "LISTENER_BACKOFF_BASE_MS",
                500,
            )),
            max_history: parse_or("MAX_HISTORY", 100),
        }
    }
}

impl Default for Config {
    /// In-memory defaults used by tests and local runs.
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            store_backend: StoreBackend::Memory,
            mongodb_uri: None,
            mongodb_database: "rolodex".to_string(),
            cache_ttl: Duration::from_secs(300),
            event_channel: "records:events".to_string(),
            service_name: "rolodex-api".to_string(),
            listener_max_attempts: 3,
            listener_backoff_base: Duration::from_millis(500),
            max_history: 100,
        }
    }
}

/// Parse an env var into its target type, falling back to the default
/// when unset, empty, or out of range for that type.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
