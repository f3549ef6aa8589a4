//! An in-process cache for remotely fetched binary resources.
//!
//! Resources are addressed by identifier strings, typically URLs. A lookup
//! that misses in memory schedules a background fetch unit which probes the
//! on-disk cache, downloads on a miss, decodes the bytes and notifies the
//! waiting subscribers exactly once. Loaded payloads live in a size-bounded
//! LRU; evicted entries are recycled and their observers detached.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use pixcache::{BlobCodec, Config, FnSubscriber, HttpFetchStrategy, ImageCache};
//!
//! fn main() -> std::io::Result<()> {
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let config = Config::default();
//!     let strategy = Arc::new(HttpFetchStrategy::new(Duration::from_secs(15)));
//!     let cache = ImageCache::new(&config, BlobCodec, strategy, runtime.handle().clone())?;
//!
//!     let subscriber = FnSubscriber::new("https://example.com/cat.png", |id, payload: Option<&bytes::Bytes>| {
//!         println!("{id}: {} bytes", payload.map_or(0, |p| p.len()));
//!     });
//!     cache.register_observer("https://example.com/cat.png", Arc::new(subscriber), None);
//!     Ok(())
//! }
//! ```

pub mod caching;
pub mod codec;
pub mod config;
pub mod download;

mod cache;
mod loader;

pub use caching::{CacheContents, CacheError, CacheKey, FnSubscriber, Subscriber};
pub use cache::{CacheStats, ImageCache};
pub use codec::{BlobCodec, Codec};
pub use config::Config;
pub use download::{FetchStrategy, FilesystemFetchStrategy, HttpFetchStrategy};

#[cfg(test)]
mod test;
