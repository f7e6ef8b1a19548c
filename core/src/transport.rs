//! Pluggable HTTP transport.
//!
//! # Design
//! The client never opens sockets itself; it hands an [`HttpRequest`] to a
//! `Transport` and classifies the [`HttpResponse`] it gets back. Non-2xx
//! statuses must come back as responses, not errors, so the client can
//! classify them. Implementations are shared across calls and threads.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::context::Context;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Redirects followed by the default agent before giving up.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// How often a waiting call re-checks its context for cancellation.
pub const CANCEL_POLL: Duration = Duration::from_millis(20);

pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs one round trip. The context's deadline, when set, bounds the
    /// whole exchange, and cancelling the context stops the wait.
    fn execute(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(DEFAULT_MAX_REDIRECTS)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Wraps a caller-configured agent. The agent must be built with
    /// `http_status_as_error(false)`.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    /// Runs the exchange on a worker thread and waits for it, polling the
    /// context every [`CANCEL_POLL`]. A cancelled or expired context returns
    /// [`TransportError::Abandoned`] right away; the worker finishes on its
    /// own, bounded by the deadline when there is one.
    fn execute(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let agent = self.agent.clone();
        let request = request.clone();
        let timeout = ctx.remaining();
        thread::Builder::new()
            .name("contentchef-http".to_string())
            .spawn(move || {
                let _ = tx.send(round_trip(&agent, &request, timeout));
            })?;

        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(reason) = ctx.err() {
                        debug!(%reason, "abandoning in-flight request");
                        return Err(TransportError::Abandoned);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Other("transport worker exited".to_string()))
                }
            }
        }
    }
}

fn round_trip(
    agent: &ureq::Agent,
    request: &HttpRequest,
    timeout: Option<Duration>,
) -> Result<HttpResponse, TransportError> {
    let url = request.url.as_str();

    macro_rules! prepare {
        ($builder:expr) => {{
            let mut builder = $builder;
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.config().timeout_global(timeout).build()
        }};
    }

    let result = match (request.method, request.body.as_deref()) {
        (HttpMethod::Get, None) => prepare!(agent.get(url)).call(),
        (HttpMethod::Get, Some(body)) => {
            prepare!(agent.get(url)).force_send_body().send(body.as_bytes())
        }
        (HttpMethod::Delete, None) => prepare!(agent.delete(url)).call(),
        (HttpMethod::Delete, Some(body)) => {
            prepare!(agent.delete(url)).force_send_body().send(body.as_bytes())
        }
        (HttpMethod::Post, Some(body)) => prepare!(agent.post(url)).send(body.as_bytes()),
        (HttpMethod::Post, None) => prepare!(agent.post(url)).send_empty(),
        (HttpMethod::Put, Some(body)) => prepare!(agent.put(url)).send(body.as_bytes()),
        (HttpMethod::Put, None) => prepare!(agent.put(url)).send_empty(),
    };
    let mut response = result.map_err(map_ureq_error)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    // Bodies are copied whole; ureq's default 10 MiB cap does not apply.
    let body = response
        .body_mut()
        .with_config()
        .limit(u64::MAX)
        .read_to_vec()
        .map_err(map_ureq_error)?;
    debug!(status, bytes = body.len(), "transport round trip finished");

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::TooManyRedirects => TransportError::TooManyRedirects,
        ureq::Error::Io(io) => TransportError::Io(io),
        ureq::Error::HostNotFound => TransportError::Connect("host not found".to_string()),
        other => TransportError::Other(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Handler =
        Box<dyn Fn(&HttpRequest, &Context) -> Result<HttpResponse, TransportError> + Send + Sync>;

    /// Transport answering from a closure and recording every request.
    pub(crate) struct StubTransport {
        handler: Handler,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        pub(crate) fn new(
            handler: impl Fn(&HttpRequest, &Context) -> Result<HttpResponse, TransportError>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn respond(status: u16, body: &str) -> Arc<Self> {
            let body = body.as_bytes().to_vec();
            Self::new(move |_, _| {
                Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.clone(),
                })
            })
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl fmt::Debug for StubTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("StubTransport").finish_non_exhaustive()
        }
    }

    impl Transport for StubTransport {
        fn execute(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.handler)(request, ctx)
        }
    }
}
