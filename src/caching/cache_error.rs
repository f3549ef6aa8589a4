use thiserror::Error;

/// An error that happens while fetching or decoding a resource.
///
/// Failures inside the background fetch pipeline are swallowed at the unit
/// boundary and surface to subscribers only as an absent payload; this type
/// mostly travels through logs and the synchronous [`FetchStrategy`]
/// contract.
///
/// [`FetchStrategy`]: crate::download::FetchStrategy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The resource was not found at the remote source.
    #[error("not found")]
    NotFound,
    /// The identifier was empty or otherwise unusable as a cache key.
    #[error("invalid identifier")]
    InvalidIdentifier,
    /// The resource could not be fetched from the remote source.
    ///
    /// The attached string contains the underlying error or the remote
    /// source's response status.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The fetch gave up after following the maximum number of redirects.
    #[error("too many redirects for `{0}`")]
    TooManyRedirects(String),
    /// An unexpected error in the cache itself.
    #[error("internal error")]
    InternalError,
}

impl From<std::io::Error> for CacheError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

impl CacheError {
    /// Maps a download failure to [`CacheError::DownloadError`], keeping
    /// only the innermost source instead of the whole error chain.
    pub(crate) fn download_error(mut error: &dyn std::error::Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }
        Self::DownloadError(error.to_string())
    }

    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

/// Result of a cache operation, either `Ok(T)` or the reason the resource
/// could not be fetched or decoded.
pub type CacheContents<T = ()> = Result<T, CacheError>;
