//! Upstream transport errors and benign/fatal classification.
//!
//! # Responsibilities
//! - Map `std::io::Error` and `h2::Error` into one closed set of categories
//! - Decide whether an error is routine connection churn or a real fault
//!
//! # Design Decisions
//! - Errors are mapped once, where they are first caught
//! - Classification works on the tag; only `Unknown` falls back to the message
//! - `is_benign` is total and side-effect free

use std::io;

use thiserror::Error;

/// Message fragments that mark an otherwise unknown error as routine churn.
const BENIGN_FRAGMENTS: [&str; 4] = ["GOAWAY", "destroyed", "closed", "socket hang up"];

/// Errors raised while talking to an upstream host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Peer reset the connection.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// Peer refused the connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// Write on a connection the peer already closed.
    #[error("broken pipe")]
    BrokenPipe,

    /// Connect, read or idle deadline elapsed.
    #[error("timed out")]
    TimedOut,

    /// Host or network unreachable.
    #[error("host unreachable")]
    Unreachable,

    /// Stream was reset with CANCEL.
    #[error("stream canceled")]
    StreamCanceled,

    /// Session, stream or socket was already closed or destroyed.
    #[error("session already closed")]
    AlreadyClosed,

    /// Peer sent GOAWAY.
    #[error("GOAWAY received")]
    GoAway,

    /// Generic HTTP/2 internal or protocol error.
    #[error("protocol internal error")]
    ProtocolInternal,

    /// Name resolution failed.
    #[error("dns lookup failed: {0}")]
    Dns(String),

    /// TLS setup or handshake failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// Anything else.
    #[error("{0}")]
    Unknown(String),
}

impl UpstreamError {
    /// Returns true for errors caused by expected connection churn.
    pub fn is_benign(&self) -> bool {
        match self {
            UpstreamError::ConnectionReset
            | UpstreamError::ConnectionRefused
            | UpstreamError::BrokenPipe
            | UpstreamError::TimedOut
            | UpstreamError::Unreachable
            | UpstreamError::StreamCanceled
            | UpstreamError::AlreadyClosed
            | UpstreamError::GoAway
            | UpstreamError::ProtocolInternal => true,
            UpstreamError::Dns(_) | UpstreamError::Tls(_) => false,
            UpstreamError::Unknown(message) => BENIGN_FRAGMENTS
                .iter()
                .any(|fragment| message.contains(fragment)),
        }
    }
}

/// Classify an optional error. An absent error is benign.
pub fn is_benign(error: Option<&UpstreamError>) -> bool {
    error.map_or(true, UpstreamError::is_benign)
}

impl From<io::Error> for UpstreamError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                UpstreamError::ConnectionReset
            }
            io::ErrorKind::ConnectionRefused => UpstreamError::ConnectionRefused,
            io::ErrorKind::BrokenPipe => UpstreamError::BrokenPipe,
            io::ErrorKind::TimedOut => UpstreamError::TimedOut,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                UpstreamError::Unreachable
            }
            io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof => {
                UpstreamError::AlreadyClosed
            }
            _ => UpstreamError::Unknown(err.to_string()),
        }
    }
}

impl From<h2::Error> for UpstreamError {
    fn from(err: h2::Error) -> Self {
        if err.is_go_away() {
            return UpstreamError::GoAway;
        }
        if err.is_io() {
            return match err.into_io() {
                Some(io_err) => io_err.into(),
                None => UpstreamError::AlreadyClosed,
            };
        }
        match err.reason() {
            Some(reason) if reason == h2::Reason::CANCEL => UpstreamError::StreamCanceled,
            Some(reason)
                if reason == h2::Reason::INTERNAL_ERROR || reason == h2::Reason::PROTOCOL_ERROR =>
            {
                UpstreamError::ProtocolInternal
            }
            Some(reason) if reason == h2::Reason::REFUSED_STREAM => UpstreamError::ConnectionRefused,
            _ => UpstreamError::Unknown(err.to_string()),
        }
    }
}
