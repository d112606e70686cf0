//! Stream forwarding.
//!
//! # Responsibilities
//! - Obtain a live session for the target host
//! - Issue the upstream GET, retrying once if the stream cannot be opened
//! - Relay status and a narrowed header set to the client
//! - Pipe the body with backpressure, accounting for the in-flight count
//!
//! # Design Decisions
//! - No client headers are forwarded upstream
//! - The upstream stream is owned by the client body: client disconnect
//!   drops it, which resets the upstream stream
//! - Any failure before headers are committed answers 502; failures after
//!   that truncate the response

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::header::ACCEPT;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use futures_util::Stream;

use crate::http::response::proxy_error;
use crate::observability::metrics;
use crate::resilience::timeouts::{with_timeout, IdleTimeout};
use crate::routing::StreamTarget;
use crate::security::headers::stream_response_headers;
use crate::upstream::error::UpstreamError;
use crate::upstream::inflight::InFlightGuard;
use crate::upstream::pool::SessionPool;
use crate::upstream::session::{BodyStream, PendingResponse, UpstreamSession};

/// Forwards validated stream requests through the session pool.
#[derive(Debug, Clone)]
pub struct StreamForwarder {
    pool: Arc<SessionPool>,
    idle_timeout: Duration,
}

impl StreamForwarder {
    pub fn new(pool: Arc<SessionPool>, idle_timeout: Duration) -> Self {
        Self { pool, idle_timeout }
    }

    /// The pool this forwarder draws sessions from.
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Proxy `target` and build the client response.
    pub async fn forward(&self, target: &StreamTarget, cors_origin: HeaderValue, request_id: &str) -> Response {
        let start = Instant::now();
        let host = target.host.as_str();

        let (pending, guard) = match self.issue(target, request_id).await {
            Some(issued) => issued,
            None => {
                metrics::record_request(host, StatusCode::BAD_GATEWAY.as_u16(), start);
                return proxy_error();
            }
        };

        let upstream = match with_timeout(self.idle_timeout, pending).await {
            Ok(response) => response,
            Err(e) => {
                log_upstream_error(host, request_id, &e, "Upstream request failed");
                metrics::record_request(host, StatusCode::BAD_GATEWAY.as_u16(), start);
                return proxy_error();
            }
        };
        metrics::record_upstream_headers(host, start);

        let (parts, body) = upstream.into_parts();
        tracing::debug!(
            request_id = %request_id,
            host = %host,
            path = %target.path,
            status = %parts.status,
            "Upstream response headers received"
        );

        let body = RelayBody {
            inner: IdleTimeout::new(body, self.idle_timeout),
            host: host.to_string(),
            request_id: request_id.to_string(),
            finished: false,
            _guard: guard,
        };

        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = stream_response_headers(&parts.headers, cors_origin);

        metrics::record_request(host, parts.status.as_u16(), start);
        response
    }

    /// Acquire a session and open the upstream stream. On a failed open the
    /// session is invalidated and the whole sequence runs once more.
    async fn issue(&self, target: &StreamTarget, request_id: &str) -> Option<(PendingResponse, InFlightGuard)> {
        let host = target.host.as_str();

        for attempt in 1..=2 {
            let session = self.live_session(host, request_id).await?;
            let guard = self.pool.track(host);

            let request = match upstream_request(target) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(request_id = %request_id, host = %host, error = %e, "Invalid upstream request");
                    return None;
                }
            };

            // Opening can wait on the peer's concurrent-stream limit.
            match with_timeout(self.idle_timeout, session.open_stream(request)).await {
                Ok(pending) => return Some((pending, guard)),
                Err(e) => {
                    drop(guard);
                    log_upstream_error(host, request_id, &e, "Failed to open upstream stream");
                    self.pool.invalidate(host, session.id()).await;
                    if attempt == 1 {
                        tracing::debug!(request_id = %request_id, host = %host, "Retrying with a fresh session");
                    }
                }
            }
        }

        None
    }

    async fn live_session(&self, host: &str, request_id: &str) -> Option<Arc<dyn UpstreamSession>> {
        match self.pool.acquire(host).await {
            Some(session) if session.is_alive() => Some(session),
            Some(session) => {
                tracing::debug!(request_id = %request_id, host = %host, session_id = %session.id(), "Session died after acquisition");
                None
            }
            None => {
                tracing::warn!(request_id = %request_id, host = %host, "No upstream session available");
                None
            }
        }
    }
}

/// Upstream GET for `target`: path, authority and `accept: */*`, nothing else.
fn upstream_request(target: &StreamTarget) -> Result<Request<()>, axum::http::Error> {
    Request::builder()
        .method(Method::GET)
        .uri(format!("https://{}{}", target.host, target.path))
        .header(ACCEPT, "*/*")
        .body(())
}

fn log_upstream_error(host: &str, request_id: &str, error: &UpstreamError, message: &str) {
    if error.is_benign() {
        tracing::debug!(request_id = %request_id, host = %host, error = %error, "{}", message);
    } else {
        tracing::error!(request_id = %request_id, host = %host, error = %error, "{}", message);
    }
}

/// Client body fed from the upstream stream. Holds the in-flight guard, so
/// the host's count drops exactly once when the body ends or is dropped.
struct RelayBody {
    inner: IdleTimeout<BodyStream>,
    host: String,
    request_id: String,
    finished: bool,
    _guard: InFlightGuard,
}

impl Stream for RelayBody {
    type Item = Result<Bytes, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(item) => item,
        };

        match &item {
            None => this.finished = true,
            Some(Err(e)) => {
                this.finished = true;
                log_upstream_error(&this.host, &this.request_id, e, "Upstream body aborted");
            }
            Some(Ok(_)) => {}
        }
        Poll::Ready(item)
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                request_id = %self.request_id,
                host = %self.host,
                "Client went away, upstream stream canceled"
            );
        }
    }
}
