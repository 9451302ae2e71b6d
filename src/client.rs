//! HTTP fetch capability.
//!
//! The scheduler only needs "fetch bytes from a URL and write them to a
//! named local file"; [`Fetcher`] is that seam, and [`HttpClient`] is the
//! reqwest-backed production implementation with streaming writes so large
//! files never sit in memory. Tests can substitute any transport.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, ClientBuilder};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::error::DownloadError;

/// Default per-request timeout, covering connect and body read.
///
/// Matches the component's historical 15-second bound per attempt; a
/// timed-out attempt counts against the retry budget like any failure.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Capability to fetch a remote resource into a local file.
///
/// Implementations report rich [`DownloadError`]s; the scheduler folds
/// them into a single boolean at the caller boundary.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` and writes the body verbatim to `dest`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] for network failures, timeouts,
    /// non-success HTTP statuses, and local IO failures.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Streaming HTTP fetcher built on reqwest.
///
/// Create once and share; the underlying client pools connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with an explicit per-request timeout.
    ///
    /// The timeout bounds each individual fetch attempt end to end,
    /// connect included.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = ClientBuilder::new()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        debug!(url = %url, dest = %dest.display(), "starting fetch");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| classify_request_error(url, error))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "fetch returned error status");
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let file = File::create(dest)
            .await
            .map_err(|error| DownloadError::io(dest, error))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| classify_request_error(url, error))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|error| DownloadError::io(dest, error))?;
            bytes_written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|error| DownloadError::io(dest, error))?;

        debug!(url = %url, bytes_written, "fetch complete");
        Ok(bytes_written)
    }
}

/// Maps a reqwest error to the download error taxonomy.
fn classify_request_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else if error.is_builder() {
        DownloadError::invalid_url(url)
    } else {
        DownloadError::network(url, error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_writes_body_verbatim() {
        let server = MockServer::start().await;
        let body = b"not really an mp4, but bytes are bytes";
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dlq_1.mp4");
        let client = HttpClient::new();

        let written = client
            .fetch(&format!("{}/clip.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = HttpClient::new();
        let result = client
            .fetch(
                &format!("{}/gone.mp4", server.uri()),
                &dir.path().join("dlq_1.mp4"),
            )
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_unwritable_dest_is_io_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        // Destination inside a directory that does not exist.
        let dest = dir.path().join("missing").join("dlq_1.mp4");
        let client = HttpClient::new();
        let result = client
            .fetch(&format!("{}/clip.mp4", server.uri()), &dest)
            .await;

        assert!(matches!(result, Err(DownloadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let dir = TempDir::new().unwrap();
        let client = HttpClient::with_timeout(Duration::from_secs(2));
        // Port 9 (discard) is a safe bet for a refused connection.
        let result = client
            .fetch(
                "http://127.0.0.1:9/clip.mp4",
                &dir.path().join("dlq_1.mp4"),
            )
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::Network { .. } | DownloadError::Timeout { .. })
        ));
    }
}
