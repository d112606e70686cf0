//! Stream path matching.
//!
//! # Responsibilities
//! - Strip the application base path, if configured
//! - Recognize the `/stream/` namespace
//! - Split `/stream/<host>/<path...>` into target host and target path
//!
//! # Design Decisions
//! - Base path is stripped first, then the `/stream/` prefix is matched
//! - Host is lowercased; path (and query) pass through verbatim
//! - No regex, no percent-decoding

use axum::http::Uri;

/// Literal prefix of the proxied namespace.
pub const STREAM_PREFIX: &str = "/stream/";

/// Upstream host and path parsed from a stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    /// Lowercased upstream host.
    pub host: String,
    /// Path from the first `/` after the host, including any query string.
    pub path: String,
}

/// Why a `/stream/` path could not be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    /// Path is outside the `/stream/` namespace.
    NotStream,
    /// No `/` after the host segment.
    MissingPath,
}

/// Remove `base_path` from the front of `path` when it is a whole segment prefix.
pub fn strip_base_path<'a>(path: &'a str, base_path: &str) -> &'a str {
    if base_path.is_empty() {
        return path;
    }
    match path.strip_prefix(base_path) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// True if `path` (after base-path stripping) is in the stream namespace.
pub fn is_stream_path(path: &str, base_path: &str) -> bool {
    strip_base_path(path, base_path).starts_with(STREAM_PREFIX)
}

impl StreamTarget {
    /// Parse a request URI into a stream target.
    pub fn from_uri(uri: &Uri, base_path: &str) -> Result<Self, MatchError> {
        let path = strip_base_path(uri.path(), base_path);
        let rest = path.strip_prefix(STREAM_PREFIX).ok_or(MatchError::NotStream)?;
        let slash = rest.find('/').ok_or(MatchError::MissingPath)?;

        let host = rest[..slash].to_lowercase();
        let mut target_path = rest[slash..].to_string();
        if let Some(query) = uri.query() {
            target_path.push('?');
            target_path.push_str(query);
        }

        Ok(Self {
            host,
            path: target_path,
        })
    }
}
