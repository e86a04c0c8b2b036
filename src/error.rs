//! Error types for the peer cache.

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the peer cache.
///
/// Errors are `Clone` so that every caller collapsed onto one in-flight load
/// observes the identical error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `Get` was called with an empty key.
    #[error("key is empty")]
    EmptyKey,

    /// The group's loader failed to produce a value.
    #[error("source fetch failed: {0}")]
    Source(String),

    /// A remote peer could not serve the value.
    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    /// No group is registered under this name.
    #[error("no such group: {0}")]
    UnknownGroup(String),

    /// A transport request did not have the `<group>/<key>` shape.
    #[error("bad request path: {0}")]
    BadRequestPath(String),

    /// A group with this name is already registered.
    #[error("group already registered: {0}")]
    DuplicateGroup(String),

    /// A peer picker was registered on a group that already has one.
    #[error("peer picker registered more than once")]
    PeersAlreadyRegistered,

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// The operation did not finish before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Peer transport errors.
///
/// These are recovered inside the group by falling back to the local loader
/// and only surface through logging and statistics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The request never produced a response.
    #[error("request to {addr} failed: {reason}")]
    Request { addr: String, reason: String },

    /// The peer answered with a non-success status.
    #[error("peer {addr} returned status {status}")]
    Status { addr: String, status: u16 },

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The peer address could not be turned into a request URL.
    #[error("invalid peer address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Build a source error from a loader failure.
    pub(crate) fn source(err: BoxError) -> Self {
        Error::Source(err.to_string())
    }

    /// Whether this error came from a peer and was therefore recoverable.
    pub fn is_peer(&self) -> bool {
        matches!(self, Error::Peer(_))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_error_converts() {
        let err: Error = PeerError::Status {
            addr: "http://10.0.0.2:8001".to_string(),
            status: 500,
        }
        .into();

        assert!(err.is_peer());
        assert_eq!(
            err.to_string(),
            "peer error: peer http://10.0.0.2:8001 returned status 500"
        );
    }

    #[test]
    fn test_source_error_keeps_message() {
        let err = Error::source("db unavailable".into());
        assert_eq!(err, Error::Source("db unavailable".to_string()));
        assert!(!err.is_peer());
    }
}
