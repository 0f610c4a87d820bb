//! Canned HTTP responses.

use anyhow::anyhow;
use futures::StreamExt;
use futures::stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::updater::download::{RequestOptions, Transport, TransportResponse};

#[derive(Debug, Clone)]
enum Route {
    Body {
        status: u16,
        content_type: Option<String>,
        chunks: Vec<Vec<u8>>,
    },
    Broken {
        partial: Vec<u8>,
    },
    Stalled,
    ConnectError(String),
}

/// [`Transport`] answering from a fixed URL table.
///
/// Unknown URLs get a 404. Clones share the request log, so a test can keep
/// one clone and hand the other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    routes: HashMap<String, Route>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StaticTransport {
    /// A transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` with status 200 and no content type.
    pub fn with_bytes(self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.with_chunked(url, vec![bytes.into()])
    }

    /// Serve `bytes` with status 200 and `content_type`.
    pub fn with_content_type(mut self, url: &str, bytes: impl Into<Vec<u8>>, content_type: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Route::Body {
                status: 200,
                content_type: Some(content_type.to_string()),
                chunks: vec![bytes.into()],
            },
        );
        self
    }

    /// Serve the concatenation of `chunks`, one stream item per chunk.
    pub fn with_chunked(mut self, url: &str, chunks: Vec<Vec<u8>>) -> Self {
        self.routes.insert(
            url.to_string(),
            Route::Body {
                status: 200,
                content_type: None,
                chunks,
            },
        );
        self
    }

    /// Answer with `status` and an empty body.
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(
            url.to_string(),
            Route::Body {
                status,
                content_type: None,
                chunks: Vec::new(),
            },
        );
        self
    }

    /// Send `partial`, then fail the stream with a connection reset.
    pub fn with_broken_body(mut self, url: &str, partial: &[u8]) -> Self {
        self.routes.insert(
            url.to_string(),
            Route::Broken {
                partial: partial.to_vec(),
            },
        );
        self
    }

    /// Answer 200 with a body that never arrives.
    pub fn with_stalled_body(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Stalled);
        self
    }

    /// Fail before any response head, like a refused connection.
    pub fn with_connect_error(mut self, url: &str, message: &str) -> Self {
        self.routes.insert(url.to_string(), Route::ConnectError(message.to_string()));
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

impl Transport for StaticTransport {
    async fn get(&self, url: &str, _options: &RequestOptions) -> anyhow::Result<TransportResponse> {
        self.requests.lock().expect("request log poisoned").push(url.to_string());

        let response = match self.routes.get(url).cloned() {
            None => TransportResponse {
                status: 404,
                content_type: None,
                content_length: Some(0),
                body: stream::empty().boxed(),
            },
            Some(Route::Body {
                status,
                content_type,
                chunks,
            }) => TransportResponse {
                status,
                content_type,
                content_length: Some(chunks.iter().map(|c| c.len() as u64).sum()),
                body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
            },
            Some(Route::Broken {
                partial,
            }) => TransportResponse {
                status: 200,
                content_type: None,
                content_length: None,
                body: stream::iter(vec![Ok(partial), Err(anyhow!("connection reset by peer"))])
                    .boxed(),
            },
            Some(Route::Stalled) => TransportResponse {
                status: 200,
                content_type: None,
                content_length: None,
                body: stream::pending().boxed(),
            },
            Some(Route::ConnectError(message)) => return Err(anyhow!(message)),
        };
        Ok(response)
    }
}
