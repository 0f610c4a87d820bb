//! Streaming artifact download with throttled progress reporting.
//!
//! The HTTP client itself sits behind the [`Transport`] capability so the
//! pipeline can be driven by reqwest in production and by in-memory fakes in
//! tests. [`Downloader::fetch`] performs a single streaming GET, buffers the
//! body in memory, and classifies it as an archive or a raw bundle.

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::constants::{
    ARCHIVE_CONTENT_MARKER, ARCHIVE_EXTENSION, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_USER_AGENT,
    PROGRESS_THROTTLE,
};
use crate::core::UpdaterError;

/// Per-request options applied to every transport call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Upper bound for a whole request, body included, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Bearer token for the release API; filled from the top-level `auth_token`.
    #[serde(skip)]
    pub auth_token: Option<String>,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            auth_token: None,
        }
    }
}

impl RequestOptions {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }
}

/// Response head plus a streaming body.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Declared body length, if any.
    pub content_length: Option<u64>,
    /// Body chunks in arrival order.
    pub body: BoxStream<'static, anyhow::Result<Vec<u8>>>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// HTTP capability consumed by the updater.
pub trait Transport: Send + Sync {
    /// Issue a GET and return once the response head is available.
    fn get(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> impl Future<Output = anyhow::Result<TransportResponse>> + Send;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self {
            client,
        }
    }

    fn headers(options: &RequestOptions) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            headers.insert(HeaderName::try_from(name.as_str())?, HeaderValue::from_str(value)?);
        }
        if let Some(token) = &options.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, options: &RequestOptions) -> anyhow::Result<TransportResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, options.user_agent.as_str())
            .headers(Self::headers(options)?)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(TransportResponse {
            status: response.status().as_u16(),
            content_type,
            content_length: response.content_length(),
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(anyhow::Error::from))
                .boxed(),
        })
    }
}

/// How a downloaded payload is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Zip archive to be expanded into the install directory.
    Archive,
    /// Raw bundle written as-is.
    Binary,
}

impl ArtifactKind {
    /// Classify a payload from its URL and declared content type.
    ///
    /// It is an archive when the content type mentions `zip` or the URL path
    /// ends in `.zip`; query strings and fragments are ignored.
    #[must_use]
    pub fn classify(url: &str, content_type: Option<&str>) -> Self {
        let by_type = content_type
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(ARCHIVE_CONTENT_MARKER));

        let path = url.split(['?', '#']).next().unwrap_or(url);
        let by_extension = path.to_ascii_lowercase().ends_with(ARCHIVE_EXTENSION);

        if by_type || by_extension { Self::Archive } else { Self::Binary }
    }
}

/// A snapshot of download progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSample {
    /// Completed fraction in `0.0..=1.0`; `0.0` while the total is unknown.
    pub fraction_complete: f64,
    /// Average transfer rate since the start.
    pub bytes_per_second: f64,
    /// Declared total size, if the server sent one.
    pub bytes_total: Option<u64>,
    /// Bytes received so far.
    pub bytes_transferred: u64,
    /// Seconds since the request started.
    pub elapsed_seconds: f64,
    /// Estimated seconds left, when both total and rate are known.
    pub remaining_seconds: Option<f64>,
}

/// Turns raw chunk arrivals into throttled [`ProgressSample`]s.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    last_emit: Instant,
    interval: Duration,
    total: Option<u64>,
    transferred: u64,
}

impl ProgressTracker {
    /// Start tracking a transfer of `total` bytes.
    #[must_use]
    pub fn new(total: Option<u64>, interval: Duration) -> Self {
        Self::starting_at(Instant::now(), total, interval)
    }

    /// Start tracking at a given instant.
    #[must_use]
    pub fn starting_at(started: Instant, total: Option<u64>, interval: Duration) -> Self {
        Self {
            started,
            last_emit: started,
            interval,
            total: total.filter(|t| *t > 0),
            transferred: 0,
        }
    }

    /// Record `len` new bytes; returns a sample if the throttle interval has passed.
    pub fn record(&mut self, len: usize) -> Option<ProgressSample> {
        self.record_at(len, Instant::now())
    }

    /// Like [`record`](Self::record) with an explicit clock reading.
    pub fn record_at(&mut self, len: usize, now: Instant) -> Option<ProgressSample> {
        self.transferred = self.transferred.saturating_add(len as u64);
        if now.duration_since(self.last_emit) < self.interval {
            return None;
        }
        self.last_emit = now;
        Some(self.sample_at(now))
    }

    /// The terminal sample, always emitted once the body is complete.
    #[must_use]
    pub fn finish(&self) -> ProgressSample {
        self.finish_at(Instant::now())
    }

    /// Like [`finish`](Self::finish) with an explicit clock reading.
    #[must_use]
    pub fn finish_at(&self, now: Instant) -> ProgressSample {
        let mut sample = self.sample_at(now);
        sample.fraction_complete = 1.0;
        sample.remaining_seconds = Some(0.0);
        sample
    }

    fn sample_at(&self, now: Instant) -> ProgressSample {
        let elapsed = now.duration_since(self.started).as_secs_f64();
        let transferred = self.transferred as f64;
        let bytes_per_second = if elapsed > 0.0 { transferred / elapsed } else { 0.0 };

        let (fraction_complete, remaining_seconds) = match self.total {
            Some(total) => {
                let total = total as f64;
                let remaining = (bytes_per_second > 0.0)
                    .then(|| (total - transferred).max(0.0) / bytes_per_second);
                ((transferred / total).clamp(0.0, 1.0), remaining)
            }
            None => (0.0, None),
        };

        ProgressSample {
            fraction_complete,
            bytes_per_second,
            bytes_total: self.total,
            bytes_transferred: self.transferred,
            elapsed_seconds: elapsed,
            remaining_seconds,
        }
    }
}

/// A fully received artifact.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    /// Exact bytes received over the wire.
    pub bytes: Vec<u8>,
    /// Archive or raw bundle.
    pub kind: ArtifactKind,
    /// Declared content type.
    pub content_type: Option<String>,
}

/// Fetches artifacts through a [`Transport`].
#[derive(Debug, Clone)]
pub struct Downloader<T> {
    transport: T,
    throttle: Duration,
}

impl<T: Transport> Downloader<T> {
    /// Create a downloader with the default 500 ms progress throttle.
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            throttle: PROGRESS_THROTTLE,
        }
    }

    /// Override the progress throttle interval.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Download `url` into memory.
    ///
    /// The whole exchange is bounded by [`RequestOptions::timeout`]. A partial
    /// body is dropped on any failure.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::UpdateFileNotFound`] on HTTP 404
    /// - [`UpdaterError::FailedToDownloadUpdate`] on transport errors, other
    ///   non-success statuses, stream errors, or timeout
    pub async fn fetch(
        &self,
        url: &str,
        options: &RequestOptions,
        on_progress: &mut (dyn FnMut(&ProgressSample) + Send),
    ) -> Result<DownloadedArtifact, UpdaterError> {
        info!("Downloading {url}");
        let timeout = options.timeout();

        match tokio::time::timeout(timeout, self.fetch_inner(url, options, on_progress)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Download of {url} timed out after {timeout:?}");
                Err(UpdaterError::FailedToDownloadUpdate {
                    url: url.to_string(),
                    reason: format!("timed out after {timeout:?}"),
                })
            }
        }
    }

    async fn fetch_inner(
        &self,
        url: &str,
        options: &RequestOptions,
        on_progress: &mut (dyn FnMut(&ProgressSample) + Send),
    ) -> Result<DownloadedArtifact, UpdaterError> {
        let failed = |reason: String| UpdaterError::FailedToDownloadUpdate {
            url: url.to_string(),
            reason,
        };

        let response = self.transport.get(url, options).await.map_err(|e| failed(format!("{e:#}")))?;
        debug!("Response head: {response:?}");

        if response.status == 404 {
            return Err(UpdaterError::UpdateFileNotFound {
                location: url.to_string(),
            });
        }
        if !(200..300).contains(&response.status) {
            return Err(failed(format!("HTTP {}", response.status)));
        }

        let kind = ArtifactKind::classify(url, response.content_type.as_deref());
        let mut tracker = ProgressTracker::new(response.content_length, self.throttle);
        let capacity = response.content_length.unwrap_or(0).min(64 * 1024 * 1024) as usize;
        let mut bytes = Vec::with_capacity(capacity);

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| failed(format!("{e:#}")))?;
            bytes.extend_from_slice(&chunk);
            if let Some(sample) = tracker.record(chunk.len()) {
                on_progress(&sample);
            }
        }
        on_progress(&tracker.finish());

        info!("Downloaded {} bytes ({kind:?})", bytes.len());
        Ok(DownloadedArtifact {
            bytes,
            kind,
            content_type: response.content_type,
        })
    }
}
