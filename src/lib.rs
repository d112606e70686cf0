//! HTTP/2 live stream proxy library.
//!
//! Serves `/stream/<host>/<path...>` by multiplexing requests over pooled,
//! long-lived HTTP/2 sessions to an allow-list of upstream hosts. Mount it
//! standalone with [`HttpServer`] or in front of an existing router with
//! [`StreamProxy::attach`].

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;
pub mod upstream;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::StreamProxyConfig;
pub use http::{HttpServer, StreamProxy};
pub use lifecycle::Shutdown;
pub use upstream::{Connector, SessionPool, UpstreamError, UpstreamSession};
