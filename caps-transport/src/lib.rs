//! HTTP transport seam for capability endpoints.
//!
//! Capability endpoints ("caps") are per-session, unguessable HTTP URLs
//! granting access to one server function. This crate provides the minimal
//! transport interface the event queue client needs: an asynchronous POST
//! with a request body, a content type, a per-request timeout, and a
//! signal for when the request has been accepted by the transport.
//!
//! The [`Transport`] trait keeps the HTTP mechanics (TLS, connection
//! pooling, proxies) out of the polling state machine, and lets tests
//! drive the state machine with a scripted fake. [`HttpTransport`] is the
//! `reqwest`-backed implementation used in production.

mod error;

pub use error::TransportError;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;
use url::Url;

/// A single outgoing long-poll POST.
#[derive(Debug, Clone)]
pub struct PollRequest {
    /// The capability endpoint to POST to.
    pub endpoint: Url,
    /// Content type of the request body.
    pub content_type: &'static str,
    /// Serialized request body.
    pub body: Vec<u8>,
    /// How long the transport may hold this request open before giving up.
    pub timeout: Duration,
}

/// The outcome of one completed round trip.
///
/// A response with a non-success status is still a `Response`; only
/// failures where no HTTP response was obtained at all surface as
/// `Failed`.
#[derive(Debug)]
pub enum PollOutcome {
    /// The server answered. The body may be empty.
    Response {
        /// HTTP status code.
        status: u16,
        /// Response body bytes, possibly empty.
        body: Bytes,
    },
    /// No response was obtained from the server.
    Failed(TransportError),
}

/// One-shot notifier for "the request has been accepted by the transport".
///
/// The event queue fires its connected callback off the first request's
/// opened signal. Transports should call [`notify`](Self::notify) once the
/// request is on the wire; dropping the signal unnotified is harmless.
#[derive(Debug)]
pub struct OpenedSignal(Option<oneshot::Sender<()>>);

impl OpenedSignal {
    /// Create a signal and the receiver that observes it.
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }

    /// Signal that the request has been accepted. Idempotent.
    pub fn notify(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// An asynchronous POST transport for capability endpoints.
///
/// # Cancellation contract
///
/// Dropping the future returned by [`post`](Self::post) must abandon the
/// underlying request. The caller relies on this to abort the in-flight
/// request during an immediate stop.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue a POST and wait for its outcome.
    ///
    /// `opened` should be notified once the request has been handed to the
    /// network, before the response arrives.
    async fn post(&self, request: PollRequest, opened: OpenedSignal) -> PollOutcome;
}

/// `reqwest`-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with default client settings.
    ///
    /// Timeouts are applied per request from [`PollRequest::timeout`], not
    /// on the client, since long-poll requests intentionally stay open far
    /// longer than ordinary calls.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport around an existing `reqwest` client.
    ///
    /// Useful when the embedding application already maintains a client
    /// with proxy or TLS configuration.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: PollRequest, mut opened: OpenedSignal) -> PollOutcome {
        let builder = self
            .client
            .post(request.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .timeout(request.timeout)
            .body(request.body);

        let pending = builder.send();
        // The request is committed to the connection pool at this point.
        opened.notify();

        let response = match pending.await {
            Ok(response) => response,
            Err(e) => return PollOutcome::Failed(classify_reqwest_error(&e)),
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => PollOutcome::Response { status, body },
            Err(e) => {
                tracing::debug!("failed to read response body: {e}");
                PollOutcome::Failed(classify_reqwest_error(&e))
            }
        }
    }
}

/// Map a `reqwest` error onto the transport error taxonomy.
///
/// Hyper does not expose keep-alive failures structurally, so connection
/// churn is recognized by message. Anything unrecognized lands in `Other`,
/// which the event queue treats as an escalating error.
fn classify_reqwest_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout;
    }
    if e.is_connect() {
        return TransportError::Connect(e.to_string());
    }
    let text = e.to_string();
    if text.contains("connection reset")
        || text.contains("connection closed")
        || text.contains("IncompleteMessage")
    {
        TransportError::ConnectionReset
    } else {
        TransportError::Other(text)
    }
}
