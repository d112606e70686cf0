//! Client-facing header rewriting.
//!
//! # Responsibilities
//! - Build CORS preflight responses
//! - Reduce upstream response headers to the minimal client set
//!
//! # Design Decisions
//! - Every upstream header not listed here is dropped
//! - `Cache-Control: no-store` always; segments must never be cached

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};

pub const ALLOW_METHODS: &str = "GET, OPTIONS";
pub const ALLOW_HEADERS: &str = "Range, Content-Type";
pub const PREFLIGHT_MAX_AGE: &str = "86400";
pub const NO_STORE: &str = "no-store";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 204 answer to an `OPTIONS` request.
pub fn preflight_response(origin: HeaderValue) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
    response
}

/// Headers sent to the client for a proxied upstream response.
pub fn stream_response_headers(upstream: &HeaderMap, origin: HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(5);

    let content_type = upstream
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));

    if let Some(length) = upstream.get(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, length.clone());
    }

    headers
}
