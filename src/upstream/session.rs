//! Upstream HTTP/2 sessions.
//!
//! # Responsibilities
//! - Give every upstream connection a unique, loggable id
//! - Expose the operations the pool and forwarder need (open stream, ping, close)
//! - Drive the h2 connection in the background and publish its close reason
//!
//! # Design Decisions
//! - `UpstreamSession` is a trait so the pool can be exercised with fake sessions
//! - Upstream stream handles are owned by the returned futures/streams;
//!   dropping them resets the stream with CANCEL
//! - Flow-control capacity is released only when the consumer pulls a chunk

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use futures_util::task::noop_waker_ref;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;

use crate::upstream::error::UpstreamError;

/// Global counter for session ids. Only uniqueness matters.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h2-{}", self.0)
    }
}

/// Upstream response body, chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Resolves once upstream response headers arrive.
pub type PendingResponse = BoxFuture<'static, Result<Response<BodyStream>, UpstreamError>>;

/// A pooled, persistent connection to one upstream host.
pub trait UpstreamSession: Send + Sync + fmt::Debug {
    /// Unique id of this session.
    fn id(&self) -> SessionId;

    /// Host this session is connected to.
    fn host(&self) -> &str;

    /// False once the connection is closed, destroyed or went away.
    fn is_alive(&self) -> bool;

    /// Issue a bodiless request. The outer future fails when the session
    /// cannot take a new stream; the inner one waits for response headers.
    fn open_stream(&self, request: Request<()>) -> BoxFuture<'static, Result<PendingResponse, UpstreamError>>;

    /// Send a protocol-level ping and wait for the ack.
    fn ping(&self) -> BoxFuture<'static, Result<(), UpstreamError>>;

    /// Resolves when the session ends, with the error that ended it, if any.
    fn closed(&self) -> BoxFuture<'static, Option<UpstreamError>>;

    /// Hard-close the connection.
    fn close(&self);
}

/// Connection status published by the driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionStatus {
    Open,
    Closed(Option<UpstreamError>),
}

/// Publish `error` as the close reason unless the session already closed.
fn mark_closed(status: &watch::Sender<SessionStatus>, error: UpstreamError) -> bool {
    status.send_if_modified(|current| {
        if *current == SessionStatus::Open {
            *current = SessionStatus::Closed(Some(error));
            true
        } else {
            false
        }
    })
}

/// An h2 client connection over any byte stream (TLS in production).
pub struct H2Session {
    id: SessionId,
    host: String,
    sender: h2::client::SendRequest<Bytes>,
    ping_pong: Arc<Mutex<Option<h2::PingPong>>>,
    status: Arc<watch::Sender<SessionStatus>>,
    driver: AbortHandle,
}

impl H2Session {
    /// Perform the h2 handshake on `io` and spawn the connection driver.
    pub async fn handshake<T>(io: T, host: &str, window_size: u32) -> Result<Self, UpstreamError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, mut connection) = h2::client::Builder::new()
            .initial_window_size(window_size)
            .initial_connection_window_size(window_size)
            .handshake::<_, Bytes>(io)
            .await?;

        let id = SessionId::new();
        let ping_pong = connection.ping_pong();
        let status = Arc::new(watch::Sender::new(SessionStatus::Open));

        let driver_status = Arc::clone(&status);
        let driver_host = host.to_string();
        let driver = tokio::spawn(async move {
            let outcome = connection.await.err().map(UpstreamError::from);
            tracing::debug!(
                host = %driver_host,
                session_id = %id,
                error = ?outcome,
                "Upstream connection ended"
            );
            driver_status.send_replace(SessionStatus::Closed(outcome));
        })
        .abort_handle();

        Ok(Self {
            id,
            host: host.to_string(),
            sender,
            ping_pong: Arc::new(Mutex::new(ping_pong)),
            status,
            driver,
        })
    }

    /// Check whether the connection can still take new streams. A received
    /// GOAWAY surfaces here while the driver is still finishing old streams.
    fn refuses_new_streams(&self) -> bool {
        let mut sender = self.sender.clone();
        let mut cx = Context::from_waker(noop_waker_ref());
        match sender.poll_ready(&mut cx) {
            Poll::Ready(Err(e)) => {
                let error = UpstreamError::from(e);
                if mark_closed(&self.status, error.clone()) {
                    tracing::debug!(host = %self.host, session_id = %self.id, error = %error, "Session stopped accepting streams");
                }
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for H2Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("H2Session")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl UpstreamSession for H2Session {
    fn id(&self) -> SessionId {
        self.id
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn is_alive(&self) -> bool {
        let open = *self.status.borrow() == SessionStatus::Open;
        open && !self.refuses_new_streams()
    }

    fn open_stream(&self, request: Request<()>) -> BoxFuture<'static, Result<PendingResponse, UpstreamError>> {
        let sender = self.sender.clone();
        let status = Arc::clone(&self.status);
        let alive = self.is_alive();
        Box::pin(async move {
            if !alive {
                return Err(UpstreamError::AlreadyClosed);
            }
            let opened = async move {
                let mut sender = sender.ready().await?;
                let (response, _send_stream) = sender.send_request(request, true)?;
                Ok::<_, UpstreamError>(response)
            };
            let response = match opened.await {
                Ok(response) => response,
                Err(e) => {
                    if e == UpstreamError::GoAway {
                        mark_closed(&status, e.clone());
                    }
                    return Err(e);
                }
            };
            let pending: PendingResponse = Box::pin(async move {
                let response = response.await?;
                Ok(response.map(recv_body))
            });
            Ok(pending)
        })
    }

    fn ping(&self) -> BoxFuture<'static, Result<(), UpstreamError>> {
        let ping_pong = Arc::clone(&self.ping_pong);
        Box::pin(async move {
            let mut guard = ping_pong.lock().await;
            let ping_pong = guard.as_mut().ok_or(UpstreamError::AlreadyClosed)?;
            ping_pong.ping(h2::Ping::opaque()).await?;
            Ok(())
        })
    }

    fn closed(&self) -> BoxFuture<'static, Option<UpstreamError>> {
        let mut rx = self.status.subscribe();
        Box::pin(async move {
            match rx.wait_for(|status| *status != SessionStatus::Open).await {
                Ok(status) => match &*status {
                    SessionStatus::Closed(err) => err.clone(),
                    SessionStatus::Open => None,
                },
                Err(_) => None,
            }
        })
    }

    fn close(&self) {
        self.driver.abort();
        self.status.send_if_modified(|status| {
            if *status == SessionStatus::Open {
                *status = SessionStatus::Closed(None);
                true
            } else {
                false
            }
        });
    }
}

/// Turn an h2 receive stream into a chunk stream, releasing flow-control
/// capacity as each chunk is pulled. Stops after the first error.
fn recv_body(body: h2::RecvStream) -> BodyStream {
    stream::unfold(Some(body), |state| async move {
        let mut body = state?;
        match body.data().await? {
            Ok(chunk) => {
                let _ = body.flow_control().release_capacity(chunk.len());
                Some((Ok(chunk), Some(body)))
            }
            Err(err) => Some((Err(UpstreamError::from(err)), None)),
        }
    })
    .boxed()
}
