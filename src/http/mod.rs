//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace and request-id layers)
//!     → request.rs (request ID)
//!     → middleware/stream_proxy.rs (/stream/* intercepted, rest to fallback)
//!     → security gatekeeper (origin, preflight, allow-list)
//!     → forward.rs (session pool → upstream stream → client body)
//!     → response.rs (502 on pre-header failure)
//! ```

pub mod forward;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use forward::StreamForwarder;
pub use middleware::{stream_proxy_middleware, StreamProxy};
pub use request::{request_id, StreamRequestId, X_REQUEST_ID};
pub use response::{proxy_error, PROXY_ERROR_MESSAGE};
pub use server::HttpServer;
