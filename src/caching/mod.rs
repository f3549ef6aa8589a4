//! Core caching primitives.
//!
//! This module hosts the pieces the cache facade is assembled from: the
//! size-bounded LRU map ([`EvictingCache`]), the shared per-resource entry
//! with its observer lists ([`ResourceEntry`]), the hashed on-disk
//! addressing ([`CacheKey`]) and the error type shared across the crate.

mod cache_error;
mod cache_key;
mod entry;
mod lru;


pub use cache_error::{CacheContents, CacheError};
pub use cache_key::CacheKey;
pub use entry::{FnSubscriber, ResourceEntry, Subscriber};
pub(crate) use entry::StickySubscriber;
pub use lru::{EvictingCache, EvictionPolicy};
