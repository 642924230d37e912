//! Upstream forwarding.
//!
//! # Responsibilities
//! - Rewrite the request for the chosen upstream (URI, Host, hop-by-hop, X-Forwarded-*)
//! - Enforce connect and response-header deadlines
//! - Stream the upstream response back without buffering
//! - Track each exchange through its phases
//!
//! # Phases
//! ```text
//! Received → HostMatched → UpstreamConnecting → Streaming → Completed
//!                                   └──────────────┴──────→ Failed
//! ```
//! Transitions only move forward. `Failed` and `Completed` are terminal; a
//! second failure is ignored, so a reset after headers is logged once and
//! never turned into a second response.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        uri::Scheme,
        Request, StatusCode, Uri, Version,
    },
    response::Response,
};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::routing::Upstream;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Scheme the client used to reach us, injected per listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardedProto {
    Http,
    Https,
}

impl ForwardedProto {
    pub fn as_str(self) -> &'static str {
        match self {
            ForwardedProto::Http => "http",
            ForwardedProto::Https => "https",
        }
    }
}

/// Per-target rewrite switches.
#[derive(Debug, Clone, Copy)]
pub struct ForwardOptions {
    /// Rewrite `Host` to the upstream authority.
    pub change_origin: bool,
    /// Append X-Forwarded-For/Host/Proto.
    pub forwarded_headers: bool,
}

/// Error type for a single forwarding attempt.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream URI: {0}")]
    InvalidUri(#[from] axum::http::Error),

    /// Connection refused, DNS failure or connect timeout.
    #[error("{0}")]
    Connect(String),

    #[error("upstream did not respond within {0:?}")]
    ResponseTimeout(Duration),

    /// The upstream accepted the connection but the exchange failed.
    #[error("{0}")]
    Upstream(String),
}

impl ProxyError {
    /// Status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ResponseTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Lifecycle phase of one proxied exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Received,
    HostMatched,
    UpstreamConnecting,
    Streaming,
    Completed,
    Failed,
}

impl ExchangePhase {
    fn rank(self) -> u8 {
        match self {
            ExchangePhase::Received => 0,
            ExchangePhase::HostMatched => 1,
            ExchangePhase::UpstreamConnecting => 2,
            ExchangePhase::Streaming => 3,
            ExchangePhase::Completed | ExchangePhase::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangePhase::Completed | ExchangePhase::Failed)
    }
}

/// Forward-only phase tracker for one request/response exchange.
#[derive(Debug)]
pub struct Exchange {
    phase: ExchangePhase,
    upstream: String,
}

impl Exchange {
    pub fn new() -> Self {
        Self {
            phase: ExchangePhase::Received,
            upstream: String::new(),
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// Move to a later phase. Returns false (and changes nothing) for
    /// backward moves or once the exchange is terminal.
    pub fn advance(&mut self, next: ExchangePhase) -> bool {
        if self.phase.is_terminal() || next.rank() <= self.phase.rank() {
            return false;
        }
        tracing::trace!(upstream = %self.upstream, from = ?self.phase, to = ?next, "Exchange phase");
        self.phase = next;
        true
    }

    /// Mark the exchange failed. Returns true only for the first failure.
    pub fn fail(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = ExchangePhase::Failed;
        true
    }

    fn for_upstream(&mut self, upstream: &Upstream) {
        self.upstream = upstream.to_string();
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body that reports completion, mid-stream failure and early
/// client disconnects for its exchange.
pub struct TrackedBody<B> {
    inner: B,
    exchange: Exchange,
}

impl<B> TrackedBody<B> {
    pub fn new(inner: B, exchange: Exchange) -> Self {
        Self { inner, exchange }
    }
}

impl<B> HttpBody for TrackedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.exchange.advance(ExchangePhase::Completed);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                if this.exchange.fail() {
                    // Headers are already committed; the client sees a truncated body.
                    tracing::warn!(upstream = %this.exchange.upstream, error = %err, "Upstream failed mid-stream");
                }
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for TrackedBody<B> {
    fn drop(&mut self) {
        if self.exchange.phase() == ExchangePhase::Streaming {
            tracing::debug!(upstream = %self.exchange.upstream, "Client went away, closing upstream response");
        }
    }
}

/// Shared HTTP client plus the response deadline.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    response_timeout: Duration,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Self {
            client,
            response_timeout: Duration::from_secs(timeouts.upstream_response_secs),
        }
    }

    /// Forward `request` to `upstream` at `path_and_query`.
    ///
    /// The returned response streams the upstream body. Errors are returned
    /// before any byte reaches the client, so callers can still answer with
    /// an error status.
    pub async fn forward(
        &self,
        mut exchange: Exchange,
        request: Request<Body>,
        upstream: &Upstream,
        path_and_query: &str,
        options: ForwardOptions,
    ) -> Result<Response, ProxyError> {
        exchange.for_upstream(upstream);
        exchange.advance(ExchangePhase::HostMatched);

        let request = match rewrite_request(request, upstream, path_and_query, options) {
            Ok(request) => request,
            Err(err) => {
                exchange.fail();
                return Err(err);
            }
        };

        exchange.advance(ExchangePhase::UpstreamConnecting);
        let result = tokio::time::timeout(self.response_timeout, self.client.request(request)).await;
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                exchange.fail();
                let reason = error_chain(&err);
                return Err(if err.is_connect() {
                    ProxyError::Connect(reason)
                } else {
                    ProxyError::Upstream(reason)
                });
            }
            Err(_) => {
                exchange.fail();
                return Err(ProxyError::ResponseTimeout(self.response_timeout));
            }
        };

        exchange.advance(ExchangePhase::Streaming);
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(TrackedBody::new(body, exchange))))
    }
}

fn rewrite_request(
    request: Request<Body>,
    upstream: &Upstream,
    path_and_query: &str,
    options: ForwardOptions,
) -> Result<Request<Body>, ProxyError> {
    let (mut parts, body) = request.into_parts();

    let client_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let proto = parts
        .extensions
        .get::<ForwardedProto>()
        .copied()
        .unwrap_or(ForwardedProto::Http);
    let original_host = parts.headers.get(header::HOST).cloned().or_else(|| {
        parts
            .uri
            .authority()
            .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
    });

    parts.uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(upstream.authority())
        .path_and_query(path_and_query)
        .build()?;
    // Upstreams speak HTTP/1.1 regardless of how the client reached us.
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers);

    if options.change_origin {
        let host = HeaderValue::from_str(&upstream.authority())
            .map_err(|err| ProxyError::InvalidUri(err.into()))?;
        parts.headers.insert(header::HOST, host);
    } else if let Some(host) = &original_host {
        parts.headers.insert(header::HOST, host.clone());
    }

    if options.forwarded_headers {
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr);
        }
        if let Some(host) = original_host {
            parts.headers.insert(X_FORWARDED_HOST, host);
        }
        parts
            .headers
            .insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto.as_str()));
    }

    Ok(Request::from_parts(parts, body))
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};

    fn options() -> ForwardOptions {
        ForwardOptions {
            change_origin: true,
            forwarded_headers: true,
        }
    }

    #[test]
    fn phases_only_move_forward() {
        let mut exchange = Exchange::new();
        assert!(exchange.advance(ExchangePhase::HostMatched));
        assert!(!exchange.advance(ExchangePhase::Received));
        assert!(exchange.advance(ExchangePhase::Streaming));
        assert!(!exchange.advance(ExchangePhase::UpstreamConnecting));
        assert!(exchange.advance(ExchangePhase::Completed));
        assert!(!exchange.fail());
        assert_eq!(exchange.phase(), ExchangePhase::Completed);
    }

    #[test]
    fn failure_is_terminal_and_idempotent() {
        let mut exchange = Exchange::new();
        exchange.advance(ExchangePhase::Streaming);
        assert!(exchange.fail());
        assert!(!exchange.fail());
        assert!(!exchange.advance(ExchangePhase::Completed));
        assert_eq!(exchange.phase(), ExchangePhase::Failed);
    }

    #[test]
    fn rewrite_targets_upstream_and_changes_origin() {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/hospitals/?city=austin")
            .header("Host", "api.example.com")
            .header("Connection", "keep-alive, x-private")
            .header("X-Private", "drop me")
            .header("Keep-Alive", "timeout=5")
            .header("Authorization", "Bearer token")
            .body(Body::from("{}"))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("10.0.0.7:5555".parse().unwrap()));
        request.extensions_mut().insert(ForwardedProto::Https);

        let upstream = Upstream::new("localhost", 3015);
        let rewritten = rewrite_request(request, &upstream, "/api/hospitals/?city=austin", options()).unwrap();

        assert_eq!(rewritten.method(), "POST");
        assert_eq!(rewritten.uri().to_string(), "http://localhost:3015/api/hospitals/?city=austin");
        assert_eq!(rewritten.headers()["host"], "localhost:3015");
        assert_eq!(rewritten.headers()["authorization"], "Bearer token");
        assert_eq!(rewritten.headers()["x-forwarded-for"], "10.0.0.7");
        assert_eq!(rewritten.headers()["x-forwarded-host"], "api.example.com");
        assert_eq!(rewritten.headers()["x-forwarded-proto"], "https");
        assert!(rewritten.headers().get("connection").is_none());
        assert!(rewritten.headers().get("keep-alive").is_none());
        assert!(rewritten.headers().get("x-private").is_none());
    }

    #[test]
    fn rewrite_can_keep_public_host() {
        let request = Request::builder()
            .uri("/")
            .header("Host", "example.com")
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        let upstream = Upstream::new("localhost", 3002);
        let rewritten = rewrite_request(
            request,
            &upstream,
            "/",
            ForwardOptions {
                change_origin: false,
                forwarded_headers: false,
            },
        )
        .unwrap();

        assert_eq!(rewritten.headers()["host"], "example.com");
        assert_eq!(rewritten.headers()["x-forwarded-for"], "203.0.113.9");
        assert!(rewritten.headers().get("x-forwarded-proto").is_none());
    }

    #[test]
    fn rewrite_reaches_ipv6_upstream() {
        let request = Request::builder()
            .uri("/status")
            .header("Host", "api.example.com")
            .body(Body::empty())
            .unwrap();
        let upstream = Upstream::new("::1", 3015);
        let rewritten = rewrite_request(request, &upstream, "/status", options()).unwrap();

        assert_eq!(rewritten.uri().to_string(), "http://[::1]:3015/status");
        assert_eq!(rewritten.headers()["host"], "[::1]:3015");
    }

    #[test]
    fn forwarded_for_appends_to_existing_chain() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        append_forwarded_for(&mut headers, "10.0.0.7:1".parse().unwrap());
        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.9, 10.0.0.7");
    }

    #[test]
    fn error_statuses() {
        assert_eq!(ProxyError::Connect("refused".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::ResponseTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[tokio::test]
    async fn tracked_body_completes_with_identical_bytes() {
        let mut exchange = Exchange::new();
        exchange.advance(ExchangePhase::Streaming);
        let body = TrackedBody::new(Full::new(Bytes::from_static(b"opaque \x00 payload")), exchange);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"opaque \x00 payload");
    }

    struct FailingBody {
        sent: bool,
    }

    impl HttpBody for FailingBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, std::io::Error>>> {
            if self.sent {
                Poll::Ready(Some(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset by peer",
                ))))
            } else {
                self.sent = true;
                Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(b"partial")))))
            }
        }
    }

    #[tokio::test]
    async fn tracked_body_surfaces_mid_stream_failure() {
        let mut exchange = Exchange::new();
        exchange.advance(ExchangePhase::Streaming);
        let mut body = TrackedBody::new(FailingBody { sent: false }, exchange);

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"partial"));
        assert!(body.frame().await.unwrap().is_err());
        assert_eq!(body.exchange.phase(), ExchangePhase::Failed);
    }
}
