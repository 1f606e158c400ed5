//! Read-through caching of the record set.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use super::CacheStore;
use crate::error::StoreError;
use crate::store::{Record, RecordStore};

/// Cache key holding the serialized record set.
pub const RECORDS_KEY: &str = "records:all";
/// Companion key holding the population timestamp of `RECORDS_KEY`.
pub const CACHED_AT_KEY: &str = "records:all:cached_at";

/// Counter keys for cache observability.
const HITS_KEY: &str = "records:cache_hits";
const MISSES_KEY: &str = "records:cache_misses";

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Store,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Cache => write!(f, "cache"),
            Source::Store => write!(f, "store"),
        }
    }
}

/// Read-through reader over the record store and shared cache.
///
/// Cache hits never touch the store. Any cache failure (backend down,
/// corrupt payload) is treated as a miss, so the reader keeps working
/// with the cache fully unavailable. A store failure is fatal to the
/// call and is never cached.
///
/// Concurrent misses may each read the store and overwrite the cache
/// entry; last writer wins. There is deliberately no populate lock.
pub struct RecordReader {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl RecordReader {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Read the record set, reporting where it was served from.
    pub async fn read(&self) -> Result<(Vec<Record>, Source), StoreError> {
        match self.cache.get(RECORDS_KEY).await {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<Record>>(&payload) {
                Ok(records) => {
                    debug!("cache hit for {}", RECORDS_KEY);
                    let _ = self.cache.increment(HITS_KEY).await;
                    return Ok((records, Source::Cache));
                }
                Err(e) => {
                    warn!("corrupt cache payload under {}, refreshing: {}", RECORDS_KEY, e);
                }
            },
            Ok(None) => debug!("cache miss for {}", RECORDS_KEY),
            Err(e) => warn!("cache read failed, falling back to store: {}", e),
        }

        let _ = self.cache.increment(MISSES_KEY).await;
        let records = self.store.list().await?;
        self.populate(&records).await;

        Ok((records, Source::Store))
    }

    /// Write the freshly read set back to the cache.
    ///
    /// Best effort: population failures leave the cache cold, they never
    /// fail the read that already has its data.
    async fn populate(&self, records: &[Record]) {
        let payload = match serde_json::to_string(records) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to serialize record set for caching: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set_with_ttl(RECORDS_KEY, &payload, self.ttl)
            .await
        {
            warn!("cache population failed: {}", e);
            return;
        }

        if let Err(e) = self
            .cache
            .set_with_ttl(CACHED_AT_KEY, &Utc::now().to_rfc3339(), self.ttl)
            .await
        {
            warn!("failed to record cache population time: {}", e);
        }
    }
}
