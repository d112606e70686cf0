//! Middleware mounted on the HTTP surface.

pub mod stream_proxy;

pub use stream_proxy::{stream_proxy_middleware, StreamProxy};
