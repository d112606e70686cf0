//! Security subsystem: the request gatekeeper.
//!
//! # Data Flow
//! ```text
//! Incoming /stream/ request:
//!     → access_control.rs (same-origin check)      → 403 Forbidden
//!     → OPTIONS? headers.rs preflight              → 204, never forwarded
//!     → routing matcher + allowlist.rs             → 400 Invalid stream host
//!     → Forward { target, cors_origin }
//! ```
//!
//! # Design Decisions
//! - Fail closed: anything not on the allow-list is rejected before any dial
//! - Rejections are plain text and never logged as server faults
//! - No trust in client input beyond path, Host, Origin and Referer

pub mod access_control;
pub mod allowlist;
pub mod headers;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use axum::response::IntoResponse;

use crate::routing::StreamTarget;

pub use allowlist::HostAllowList;

/// A request the gatekeeper refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Cross-origin request.
    Forbidden,
    /// Malformed stream URL or host not on the allow-list.
    InvalidHost,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::InvalidHost => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::Forbidden => "Forbidden",
            Rejection::InvalidHost => "Invalid stream host",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        (self.status(), self.message()).into_response()
    }
}

/// What to do with a request that passed the gate.
#[derive(Debug)]
pub enum GateDecision {
    /// Forward to `target`, answering with `cors_origin`.
    Forward {
        target: StreamTarget,
        cors_origin: HeaderValue,
    },
    /// Answer the CORS preflight directly.
    Preflight(Response<Body>),
}

/// Validates inbound stream requests.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    allowlist: HostAllowList,
    base_path: String,
}

impl Gatekeeper {
    pub fn new(allowlist: HostAllowList, base_path: impl Into<String>) -> Self {
        Self {
            allowlist,
            base_path: base_path.into(),
        }
    }

    /// Hosts that may be dialed.
    pub fn allowlist(&self) -> &HostAllowList {
        &self.allowlist
    }

    /// Base path stripped before `/stream/` matching.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Run the origin gate, preflight handling and target parsing, in that order.
    pub fn validate(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Result<GateDecision, Rejection> {
        if !access_control::is_same_origin(headers, uri) {
            return Err(Rejection::Forbidden);
        }

        let cors_origin = access_control::cors_origin(headers, uri);
        if *method == Method::OPTIONS {
            return Ok(GateDecision::Preflight(headers::preflight_response(cors_origin)));
        }

        let target = StreamTarget::from_uri(uri, &self.base_path).map_err(|_| Rejection::InvalidHost)?;
        if !self.allowlist.contains(&target.host) {
            return Err(Rejection::InvalidHost);
        }

        Ok(GateDecision::Forward { target, cors_origin })
    }
}
