//! Helpers shared by the subcommands.

use futures::StreamExt;
use std::path::Path;
use tracing::debug;

use crate::config::UpdaterConfig;
use crate::constants::MANIFEST_FETCH_TIMEOUT;
use crate::core::UpdaterError;
use crate::updater::{RemoteManifest, RequestOptions, Transport};

/// Pick the manifest location: `--manifest` first, then `remote_source`.
pub fn resolve_remote_source(
    arg: Option<&str>,
    config: &UpdaterConfig,
) -> Result<String, UpdaterError> {
    arg.or(config.remote_source.as_deref())
        .map(str::to_string)
        .ok_or_else(|| UpdaterError::ConfigError {
            message: "no release manifest source; pass --manifest or set remote_source".to_string(),
        })
}

/// Fetch and parse the remote manifest from an `http(s)` URL or a local file.
///
/// # Errors
///
/// - [`UpdaterError::CannotConnectToApi`] when the source cannot be reached,
///   answers with a non-success status, or times out
/// - [`UpdaterError::ApiResponseInvalid`] when the body is not a manifest
pub async fn fetch_remote_manifest<T: Transport>(
    transport: &T,
    source: &str,
    options: &RequestOptions,
) -> Result<RemoteManifest, UpdaterError> {
    let unreachable = |reason: String| UpdaterError::CannotConnectToApi {
        url: source.to_string(),
        reason,
    };

    if !(source.starts_with("http://") || source.starts_with("https://")) {
        debug!("Reading release manifest from {source}");
        let content = tokio::fs::read_to_string(Path::new(source))
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        return RemoteManifest::from_json(&content);
    }

    debug!("Fetching release manifest from {source}");
    let request = async {
        let response = transport.get(source, options).await.map_err(|e| unreachable(format!("{e:#}")))?;
        if !(200..300).contains(&response.status) {
            return Err(unreachable(format!("HTTP {}", response.status)));
        }

        let mut body = Vec::new();
        let mut stream = response.body;
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.map_err(|e| unreachable(format!("{e:#}")))?);
        }
        Ok(body)
    };

    let body = tokio::time::timeout(MANIFEST_FETCH_TIMEOUT, request)
        .await
        .map_err(|_| unreachable(format!("timed out after {MANIFEST_FETCH_TIMEOUT:?}")))??;

    let content = String::from_utf8(body).map_err(|e| UpdaterError::ApiResponseInvalid {
        reason: e.to_string(),
    })?;
    RemoteManifest::from_json(&content)
}
