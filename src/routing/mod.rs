//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → matcher.rs (strip base path, match /stream/ prefix)
//!     → /stream/<host>/<path...>: StreamTarget { host, path } → gatekeeper
//!     → anything else: handed to the fallback (static files)
//! ```
//!
//! # Design Decisions
//! - One fixed namespace; no route table
//! - Deterministic: same input always yields the same target

pub mod matcher;

pub use matcher::{is_stream_path, strip_base_path, MatchError, StreamTarget, STREAM_PREFIX};
