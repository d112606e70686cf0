//! Per-host upstream session pool.
//!
//! # Responsibilities
//! - Hold at most one active and one pre-warmed standby session per host
//! - Rotate sessions on age, without interrupting in-flight requests
//! - Drain replaced sessions before hard-closing them
//! - Detach sessions as soon as they close, go away or fail a ping
//!
//! # Design Decisions
//! - Entries are created lazily and live for the pool's lifetime
//! - Slot changes happen under the entry's mutex; spawned tasks re-check
//!   slot ownership by session id before touching anything
//! - All timers run on `tokio::time`, so tests drive them with a paused clock

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::health::liveness;
use crate::observability::metrics;
use crate::upstream::connector::Connector;
use crate::upstream::error::is_benign;
use crate::upstream::inflight::{InFlight, InFlightGuard};
use crate::upstream::session::{SessionId, UpstreamSession};

/// Timing knobs for the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Sessions older than this are rotated.
    pub max_age: Duration,
    /// Age after which a standby session is dialed.
    pub prewarm_after: Duration,
    /// Interval between liveness pings.
    pub ping_interval: Duration,
    /// Grace period before a rotated-out session is closed.
    pub drain_delay: Duration,
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        let max_age = Duration::from_secs(config.max_age_secs);
        Self {
            max_age,
            prewarm_after: max_age.mul_f64(config.prewarm_ratio),
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            drain_delay: Duration::from_secs(config.drain_delay_secs),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

/// Snapshot of one host's pool entry.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub session: Option<SessionId>,
    pub standby: Option<SessionId>,
    pub active: usize,
    pub session_age: Option<Duration>,
}

#[derive(Default)]
struct Slots {
    session: Option<Arc<dyn UpstreamSession>>,
    next_session: Option<Arc<dyn UpstreamSession>>,
    created_at: Option<Instant>,
    ping_task: Option<AbortHandle>,
}

/// Pool state for one upstream host.
pub struct PoolEntry {
    host: String,
    slots: Mutex<Slots>,
    inflight: InFlight,
    prewarming: AtomicBool,
    drain_delay: Duration,
}

impl PoolEntry {
    fn new(host: &str, drain_delay: Duration) -> Self {
        Self {
            host: host.to_string(),
            slots: Mutex::new(Slots::default()),
            inflight: InFlight::new(),
            prewarming: AtomicBool::new(false),
            drain_delay,
        }
    }

    /// Host this entry belongs to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Null out whichever slot holds session `id` and drain it. Stops the
    /// ping timer if the active session is the one being detached.
    pub(crate) async fn detach(&self, id: SessionId) {
        let mut slots = self.slots.lock().await;
        if slots.session.as_ref().is_some_and(|s| s.id() == id) {
            if let Some(ping) = slots.ping_task.take() {
                ping.abort();
            }
            if let Some(session) = slots.session.take() {
                tracing::debug!(host = %self.host, session_id = %id, "Active session detached");
                drain_then_close(session, self.drain_delay);
            }
        }
        if slots.next_session.as_ref().is_some_and(|s| s.id() == id) {
            if let Some(session) = slots.next_session.take() {
                tracing::debug!(host = %self.host, session_id = %id, "Standby session detached");
                drain_then_close(session, self.drain_delay);
            }
        }
    }
}

/// Process-wide map of host to session pool entry.
pub struct SessionPool {
    connector: Arc<dyn Connector>,
    settings: PoolSettings,
    entries: DashMap<String, Arc<PoolEntry>>,
}

impl SessionPool {
    /// Create an empty pool.
    pub fn new(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        Self {
            connector,
            settings,
            entries: DashMap::new(),
        }
    }

    fn entry(&self, host: &str) -> Arc<PoolEntry> {
        self.entries
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(PoolEntry::new(host, self.settings.drain_delay)))
            .clone()
    }

    /// Return a usable session for `host`, rotating or dialing as needed.
    ///
    /// Returns `None` when a fresh dial fails. Callers must still check
    /// `is_alive` before use: a session can die right after this returns.
    pub async fn acquire(&self, host: &str) -> Option<Arc<dyn UpstreamSession>> {
        let entry = self.entry(host);
        let mut slots = entry.slots.lock().await;

        let alive = slots.session.as_ref().is_some_and(|s| s.is_alive());
        let age = slots.created_at.map(|t| t.elapsed());
        let fresh = age.is_some_and(|age| age < self.settings.max_age);

        if alive && fresh {
            let due = age.is_some_and(|age| age > self.settings.prewarm_after);
            if due && slots.next_session.is_none() {
                self.spawn_prewarm(&entry);
            }
            return slots.session.clone();
        }

        if alive && entry.inflight.active() > 0 {
            tracing::debug!(
                host = %host,
                active = entry.inflight.active(),
                "Session past max age but busy, deferring rotation"
            );
            return slots.session.clone();
        }

        if let Some(old) = slots.session.take() {
            drain_then_close(old, self.settings.drain_delay);
        }
        if let Some(ping) = slots.ping_task.take() {
            ping.abort();
        }
        slots.created_at = None;

        if let Some(standby) = slots.next_session.take() {
            if standby.is_alive() {
                tracing::info!(host = %host, session_id = %standby.id(), "Promoted standby session");
                metrics::record_rotation(host, "promoted");
                self.install(&entry, &mut slots, Arc::clone(&standby));
                return Some(standby);
            }
        }

        match self.connector.connect(host).await {
            Ok(session) => {
                metrics::record_session_dial(host, true);
                metrics::record_rotation(host, "dialed");
                tracing::info!(host = %host, session_id = %session.id(), "Upstream session created");
                watch_session(&entry, Arc::clone(&session));
                self.install(&entry, &mut slots, Arc::clone(&session));
                Some(session)
            }
            Err(e) => {
                metrics::record_session_dial(host, false);
                tracing::error!(host = %host, error = %e, "Failed to connect to upstream");
                None
            }
        }
    }

    /// Count a request against `host`'s active session.
    pub fn track(&self, host: &str) -> InFlightGuard {
        self.entry(host).inflight.track(host)
    }

    /// Drop the active session for `host` if it is still `id`, forcing the
    /// next acquisition to rotate.
    pub async fn invalidate(&self, host: &str, id: SessionId) {
        if let Some(entry) = self.entries.get(host).map(|e| Arc::clone(e.value())) {
            entry.detach(id).await;
        }
    }

    /// Snapshot of `host`'s entry, if one exists.
    pub async fn stats(&self, host: &str) -> Option<PoolStats> {
        let entry = self.entries.get(host).map(|e| Arc::clone(e.value()))?;
        let slots = entry.slots.lock().await;
        Some(PoolStats {
            session: slots.session.as_ref().map(|s| s.id()),
            standby: slots.next_session.as_ref().map(|s| s.id()),
            active: entry.inflight.active(),
            session_age: slots.created_at.map(|t| t.elapsed()),
        })
    }

    /// Pool timing settings.
    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    fn install(&self, entry: &Arc<PoolEntry>, slots: &mut Slots, session: Arc<dyn UpstreamSession>) {
        slots.created_at = Some(Instant::now());
        slots.ping_task = Some(liveness::spawn_liveness_check(
            Arc::clone(entry),
            Arc::clone(&session),
            self.settings.ping_interval,
        ));
        slots.session = Some(session);
    }

    fn spawn_prewarm(&self, entry: &Arc<PoolEntry>) {
        if entry.prewarming.swap(true, Ordering::SeqCst) {
            return;
        }

        let entry = Arc::clone(entry);
        let connector = Arc::clone(&self.connector);
        tokio::spawn(async move {
            tracing::debug!(host = %entry.host, "Pre-warming standby session");
            match connector.connect(&entry.host).await {
                Ok(session) => {
                    metrics::record_session_dial(&entry.host, true);
                    watch_session(&entry, Arc::clone(&session));
                    let mut slots = entry.slots.lock().await;
                    if slots.next_session.is_none() {
                        tracing::debug!(host = %entry.host, session_id = %session.id(), "Standby session ready");
                        slots.next_session = Some(session);
                    } else {
                        session.close();
                    }
                }
                Err(e) => {
                    metrics::record_session_dial(&entry.host, false);
                    tracing::warn!(host = %entry.host, error = %e, "Failed to pre-warm upstream session");
                }
            }
            entry.prewarming.store(false, Ordering::SeqCst);
        });
    }
}

/// Close `session` after `delay`, letting streams already on it finish.
/// Closing releases the socket and ends the session's watcher task.
fn drain_then_close(session: Arc<dyn UpstreamSession>, delay: Duration) {
    tracing::debug!(host = %session.host(), session_id = %session.id(), ?delay, "Draining session");
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        session.close();
        tracing::debug!(host = %session.host(), session_id = %session.id(), "Drained session closed");
    });
}

/// Detach `session` from `entry` once it closes, logging real faults.
fn watch_session(entry: &Arc<PoolEntry>, session: Arc<dyn UpstreamSession>) {
    let entry = Arc::clone(entry);
    tokio::spawn(async move {
        let outcome = session.closed().await;
        if !is_benign(outcome.as_ref()) {
            if let Some(e) = &outcome {
                tracing::warn!(host = %entry.host, session_id = %session.id(), error = %e, "Upstream session error");
            }
        }
        entry.detach(session.id()).await;
    });
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("connector", &self.connector)
            .field("settings", &self.settings)
            .field("hosts", &self.entries.len())
            .finish()
    }
}
