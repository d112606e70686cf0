//! Startup orchestration.
//!
//! # Responsibilities
//! - Pre-warm one upstream session per allow-listed host
//!
//! # Design Decisions
//! - Pre-warm runs in the background; the listener never waits on it
//! - A failed pre-warm dial is logged by the pool and retried lazily by
//!   the first request for that host

use std::sync::Arc;

use crate::security::HostAllowList;
use crate::upstream::SessionPool;

/// Spawn one acquisition per allow-listed host.
pub fn prewarm_all(pool: &Arc<SessionPool>, allowlist: &HostAllowList) {
    for host in allowlist.iter() {
        let pool = Arc::clone(pool);
        let host = host.to_string();
        tokio::spawn(async move {
            if let Some(session) = pool.acquire(&host).await {
                tracing::info!(host = %host, session_id = %session.id(), "Pre-warmed upstream session");
            }
        });
    }
}
