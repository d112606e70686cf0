//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Init logging/metrics → Pre-warm → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Let in-flight streams finish → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listener starts last, but never waits for pre-warm dials
//! - Pool sessions are not torn down explicitly; process exit closes them

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
pub use startup::prewarm_all;
