//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarder needs a session for host
//!     → pool.rs (reuse / promote standby / dial)
//!     → connector.rs (TCP → TLS (ALPN h2) → h2 handshake)
//!     → session.rs (open stream, ping, close)
//!     → inflight.rs (count dispatched requests per host)
//!
//! Session lifecycle:
//!     Dialed → Standby? → Active → Draining → Closed
//!                                 ↘ Detached (closed / GOAWAY / ping failure)
//! ```
//!
//! # Design Decisions
//! - One logical pool entry per allow-listed host; no cross-host sharing
//! - Transport errors mapped once into `UpstreamError` and classified there
//! - Connector and session are traits so the pool is testable in isolation

pub mod connector;
pub mod error;
pub mod inflight;
pub mod pool;
pub mod session;

pub use connector::{Connector, TlsH2Connector};
pub use error::{is_benign, UpstreamError};
pub use inflight::{InFlight, InFlightGuard};
pub use pool::{PoolSettings, PoolStats, SessionPool};
pub use session::{BodyStream, H2Session, PendingResponse, SessionId, UpstreamSession};
