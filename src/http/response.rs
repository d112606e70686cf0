//! Client-facing error responses.
//!
//! Every failure before upstream headers arrive collapses to one plain-text
//! 502. Failures after headers are committed cannot be reported; the body is
//! simply cut short.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Body of every 502 this proxy produces.
pub const PROXY_ERROR_MESSAGE: &str = "Stream proxy error";

/// Plain-text 502.
pub fn proxy_error() -> Response {
    (StatusCode::BAD_GATEWAY, PROXY_ERROR_MESSAGE).into_response()
}

/// Default fallback for paths outside `/stream/`.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
