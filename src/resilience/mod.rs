//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream request:
//!     → timeouts.rs with_timeout (wait for response headers)
//!     → timeouts.rs IdleTimeout (between body chunks)
//!     → on timeout: upstream stream dropped (RST_STREAM CANCEL)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream wait has a deadline
//! - Exactly one retry, and only when a stream cannot be opened at all
//!   (see http::forward); no retries for responses, timeouts or dials

pub mod timeouts;

pub use timeouts::{with_timeout, IdleTimeout};
