//! Upstream health subsystem.
//!
//! # Data Flow
//! ```text
//! Session installed in pool
//!     → liveness.rs (ping every interval)
//!     → ping ok: keep going
//!     → ping failed / timed out: detach session from pool entry
//!     → next acquire rotates or re-dials
//! ```
//!
//! # Design Decisions
//! - One ping task per active session, owned by the pool entry
//! - Standby sessions are not pinged; they are checked when promoted
//! - Passive signals (stream errors, GOAWAY) are handled by the pool's close watcher

pub mod liveness;
