//! Error taxonomy.
//!
//! Each component's contract states which errors are fatal and which
//! degrade:
//! - `StoreError` is fatal to the calling read/write operation and is
//!   surfaced to the caller.
//! - `CacheError` is never fatal: every cache operation degrades to a
//!   no-op or a miss and is logged, not surfaced.
//! - Decode failures on the event bus are skipped by the listen loop.

use thiserror::Error;

/// Errors from the ground-truth record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same email already exists.
    #[error("a record with email '{0}' already exists")]
    DuplicateEmail(String),

    /// The backing datastore is unreachable or a query failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors from the shared cache store (KV and pub/sub).
///
/// These never propagate to API callers; the reader treats them as a
/// cache miss and the writer logs and continues.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend is unreachable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The pub/sub subscription was closed by the transport.
    #[error("subscription closed")]
    SubscriptionClosed,
}

/// A write request rejected before touching storage.
#[derive(Debug, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

/// Errors surfaced by the write path.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
