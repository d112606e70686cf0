//! In-flight stream accounting per upstream host.
//!
//! # Responsibilities
//! - Count requests currently dispatched on a host's session
//! - Decrement exactly once per request, however the request ends
//! - Never go below zero

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Counts in-flight upstream streams for one host.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched request. Returns a guard that releases on drop.
    pub fn track(&self, host: &str) -> InFlightGuard {
        let active = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(host = %host, active, "Upstream stream dispatched");
        metrics::record_active_streams(host, active);
        InFlightGuard {
            inflight: self.clone(),
            host: host.to_string(),
        }
    }

    /// Current number of in-flight requests.
    pub fn active(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Decrement, clamping at zero. Returns the new count.
    pub fn release(&self) -> usize {
        match self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
        {
            Ok(prev) | Err(prev) => prev.saturating_sub(1),
        }
    }
}

/// Guard tied to one dispatched request.
#[derive(Debug)]
pub struct InFlightGuard {
    inflight: InFlight,
    host: String,
}

impl InFlightGuard {
    /// Host this request was dispatched to.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let active = self.inflight.release();
        tracing::trace!(host = %self.host, active, "Upstream stream released");
        metrics::record_active_streams(&self.host, active);
    }
}
