use std::io;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::prelude::*;

use crate::caching::{CacheContents, CacheError};
use crate::download::FetchStrategy;

/// Fetches resources from a directory on the local filesystem.
///
/// The identifier is interpreted as a path relative to the source
/// directory. Mostly useful for tests and for seeding from pre-fetched
/// assets.
#[derive(Debug, Clone)]
pub struct FilesystemFetchStrategy {
    source: PathBuf,
}

impl FilesystemFetchStrategy {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    async fn copy(&self, identifier: &str, destination: &Path) -> CacheContents<()> {
        let source = self.source.join(identifier);
        tracing::debug!(source = %source.display(), "Copying local resource");
        match tokio::fs::copy(&source, destination).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CacheError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

impl FetchStrategy for FilesystemFetchStrategy {
    fn fetch<'a>(
        &'a self,
        identifier: &'a str,
        destination: &'a Path,
    ) -> BoxFuture<'a, CacheContents<()>> {
        self.copy(identifier, destination).boxed()
    }
}
