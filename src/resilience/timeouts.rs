//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the wait for upstream response headers
//! - Cancel an upstream body that goes idle between chunks
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The idle deadline resets on every chunk, so long transfers that keep
//!   moving are never cut
//! - Timing out drops the inner stream, which cancels the upstream stream

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::time::{Instant, Sleep};

use crate::upstream::error::UpstreamError;

/// Await `future`, failing with `UpstreamError::TimedOut` after `limit`.
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .unwrap_or(Err(UpstreamError::TimedOut))
}

/// Stream wrapper that errors with `TimedOut` when no item arrives within
/// `idle` and then ends.
pub struct IdleTimeout<S> {
    inner: Option<S>,
    idle: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl<S> IdleTimeout<S> {
    pub fn new(inner: S, idle: Duration) -> Self {
        Self {
            inner: Some(inner),
            idle,
            sleep: Box::pin(tokio::time::sleep(idle)),
        }
    }
}

impl<S, T> Stream for IdleTimeout<S>
where
    S: Stream<Item = Result<T, UpstreamError>> + Unpin,
{
    type Item = Result<T, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                let deadline = Instant::now() + this.idle;
                this.sleep.as_mut().reset(deadline);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => match this.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.inner = None;
                    Poll::Ready(Some(Err(UpstreamError::TimedOut)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
