//! Session liveness checking.
//!
//! # Responsibilities
//! - Periodically ping the active session of a pool entry
//! - Detach the session when a ping fails or times out
//! - Stop once the session it monitors is no longer alive

use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{self, Instant};

use crate::observability::metrics;
use crate::upstream::error::UpstreamError;
use crate::upstream::pool::PoolEntry;
use crate::upstream::session::UpstreamSession;

/// Spawn the ping loop for `session`. The returned handle is stored on the
/// pool entry and aborted when the session is replaced.
pub fn spawn_liveness_check(
    entry: Arc<PoolEntry>,
    session: Arc<dyn UpstreamSession>,
    interval: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);

        loop {
            ticker.tick().await;

            if !session.is_alive() {
                tracing::debug!(
                    host = %entry.host(),
                    session_id = %session.id(),
                    "Session gone, stopping liveness check"
                );
                break;
            }

            // A ping that takes a whole interval counts as failed.
            let outcome = match time::timeout(interval, session.ping()).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::TimedOut),
            };

            match outcome {
                Ok(()) => {
                    tracing::trace!(host = %entry.host(), session_id = %session.id(), "Ping ok");
                }
                Err(e) => {
                    tracing::warn!(
                        host = %entry.host(),
                        session_id = %session.id(),
                        error = %e,
                        "Ping failed, detaching session"
                    );
                    metrics::record_ping_failure(entry.host());
                    entry.detach(session.id()).await;
                    break;
                }
            }
        }
    })
    .abort_handle()
}
