//! Strategies for bringing resource bytes onto the local disk.
//!
//! A [`FetchStrategy`] materializes the bytes behind an identifier into a
//! destination file. The cache ships an HTTP strategy with manual redirect
//! handling and a filesystem strategy for local sources; callers can
//! override the strategy per resource.

use std::path::Path;

use futures::future::BoxFuture;

use crate::caching::CacheContents;

mod filesystem;
mod http;

pub use filesystem::FilesystemFetchStrategy;
pub use http::{HttpFetchStrategy, MAX_REDIRECTS};

/// The User-Agent sent with outgoing HTTP requests.
pub const USER_AGENT: &str = concat!("pixcache/", env!("CARGO_PKG_VERSION"));

/// Fetches the bytes behind an identifier into a file on the local disk.
pub trait FetchStrategy: Send + Sync + 'static {
    /// Writes the resource named by `identifier` to `destination`.
    ///
    /// On error the destination file may or may not exist; callers decide
    /// whether leftover bytes are usable by attempting a decode.
    fn fetch<'a>(
        &'a self,
        identifier: &'a str,
        destination: &'a Path,
    ) -> BoxFuture<'a, CacheContents<()>>;
}
