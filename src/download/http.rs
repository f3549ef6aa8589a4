use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::prelude::*;
use reqwest::{Client, StatusCode, Url, redirect};

use crate::caching::{CacheContents, CacheError};
use crate::download::{FetchStrategy, USER_AGENT};

/// The maximum number of redirects followed before a fetch is abandoned.
pub const MAX_REDIRECTS: usize = 5;

/// Fetches resources over HTTP(S), treating the identifier as a URL.
///
/// Redirects are followed by hand rather than by the client so the hop
/// count is bounded and a missing `Location` header surfaces as a proper
/// download error instead of a hung request.
#[derive(Debug, Clone)]
pub struct HttpFetchStrategy {
    client: Client,
}

impl HttpFetchStrategy {
    pub fn new(connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        Self { client }
    }

    /// Uses a preconfigured client, e.g. one with custom TLS settings.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, identifier: &str, destination: &Path) -> CacheContents<()> {
        let mut url = Url::parse(identifier)
            .map_err(|_| CacheError::DownloadError(format!("invalid URL: `{identifier}`")))?;

        for _ in 0..=MAX_REDIRECTS {
            tracing::debug!(url = %url, "Fetching resource");
            let response = self
                .client
                .get(url.clone())
                .header("User-Agent", USER_AGENT)
                .send()
                .await?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|header| header.to_str().ok())
                    .ok_or_else(|| {
                        CacheError::DownloadError(format!(
                            "no content and no redirect target at `{url}`"
                        ))
                    })?;
                url = url.join(location).map_err(|_| {
                    CacheError::DownloadError(format!("invalid redirect target: `{location}`"))
                })?;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Err(CacheError::NotFound);
            }
            if !status.is_success() {
                return Err(CacheError::DownloadError(format!(
                    "`{status}` at `{url}`"
                )));
            }

            let body = response.bytes().await?;
            tokio::fs::write(destination, &body).await?;
            return Ok(());
        }

        Err(CacheError::TooManyRedirects(identifier.to_owned()))
    }
}

impl FetchStrategy for HttpFetchStrategy {
    fn fetch<'a>(
        &'a self,
        identifier: &'a str,
        destination: &'a Path,
    ) -> BoxFuture<'a, CacheContents<()>> {
        self.download(identifier, destination).boxed()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;

    use super::*;

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn strategy() -> HttpFetchStrategy {
        HttpFetchStrategy::new(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_follows_redirect_chain() {
        let router = axum::Router::new()
            .route(
                "/start",
                get(|| async { (StatusCode::FOUND, [("Location", "/hop")], "").into_response() }),
            )
            .route(
                "/hop",
                get(|| async { (StatusCode::FOUND, [("Location", "/end")], "").into_response() }),
            )
            .route("/end", get(|| async { "payload" }));
        let server = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("resource");
        strategy()
            .fetch(&format!("{server}/start"), &destination)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_redirects() {
        let router = axum::Router::new().route(
            "/loop",
            get(|| async { (StatusCode::FOUND, [("Location", "/loop")], "").into_response() }),
        );
        let server = serve(router).await;
        let url = format!("{server}/loop");

        let dir = tempfile::tempdir().unwrap();
        let result = strategy().fetch(&url, &dir.path().join("resource")).await;
        assert_eq!(result, Err(CacheError::TooManyRedirects(url)));
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let server = serve(axum::Router::new()).await;

        let dir = tempfile::tempdir().unwrap();
        let result = strategy()
            .fetch(&format!("{server}/nothing"), &dir.path().join("resource"))
            .await;
        assert_eq!(result, Err(CacheError::NotFound));
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_an_error() {
        let router = axum::Router::new().route(
            "/broken",
            get(|| async { StatusCode::FOUND.into_response() }),
        );
        let server = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let result = strategy()
            .fetch(&format!("{server}/broken"), &dir.path().join("resource"))
            .await;
        assert!(matches!(result, Err(CacheError::DownloadError(_))));
    }
}
