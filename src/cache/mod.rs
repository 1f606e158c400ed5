//! Cache module - shared cache store and read-through reader.
//!
//! ## Architecture
//!
//! The cache system has two layers:
//! - `CacheStore` - the shared key-value store with per-entry TTL,
//!   counters, and the pub/sub primitives that carry the event bus
//! - `RecordReader` - read-through caching of the record set over
//!   the store + cache pair
//!
//! Cache failures never propagate to callers: the reader degrades to
//! always-miss behavior and the writer logs and continues.

mod reader;
mod store;

pub use reader::{RecordReader, Source, CACHED_AT_KEY, RECORDS_KEY};
pub use store::{CacheStore, MemoryCacheStore, Subscription};
