//! Same-origin enforcement.
//!
//! A request is accepted when its `Origin` equals `http://<Host>` or
//! `https://<Host>`, when its `Referer` starts with either, or when it
//! carries neither header (non-browser clients).

use axum::http::header::{HOST, ORIGIN, REFERER};
use axum::http::{HeaderMap, HeaderValue, Uri};

/// Host the client addressed: `Host` header, else the URI authority.
pub fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> Option<&'a str> {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: axum::http::HeaderName) -> Option<&'a str> {
    // Present but non-UTF-8 counts as present and never matches.
    headers.get(name).map(|v| v.to_str().unwrap_or(""))
}

/// Check the `Origin`/`Referer` headers against the request host.
pub fn is_same_origin(headers: &HeaderMap, uri: &Uri) -> bool {
    let origin = header_str(headers, ORIGIN);
    let referer = header_str(headers, REFERER);

    if origin.is_none() && referer.is_none() {
        return true;
    }

    let Some(host) = request_host(headers, uri) else {
        return false;
    };
    let allowed = [format!("http://{host}"), format!("https://{host}")];

    let origin_ok = origin.is_some_and(|o| allowed.iter().any(|a| o == a));
    let referer_ok = referer.is_some_and(|r| allowed.iter().any(|a| r.starts_with(a.as_str())));
    origin_ok || referer_ok
}

/// Value for `Access-Control-Allow-Origin`: the request's `Origin`, else
/// `http://<Host>`.
pub fn cors_origin(headers: &HeaderMap, uri: &Uri) -> HeaderValue {
    if let Some(origin) = headers.get(ORIGIN) {
        return origin.clone();
    }
    request_host(headers, uri)
        .and_then(|host| HeaderValue::from_str(&format!("http://{host}")).ok())
        .unwrap_or_else(|| HeaderValue::from_static("null"))
}
