//! Errors raised on the device communication path.

use thiserror::Error;

/// A failed exchange with the TV.
///
/// Every boundary in the crate resolves to either a value or one of these variants; none of them
/// are surfaced as panics. Transient variants (`Transport`, `Timeout`) are retried by the owning
/// component's own policy, never inside a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum DeviceError {
    /// The request could not be delivered (connection refused, TLS failure, reset, etc).
    #[error("transport error: {0}")]
    Transport(String),
    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,
    /// The TV rejected the request's authentication.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The TV answered with a non-2xx status.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// The TV answered with a body that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The HTTP client could not be constructed.
    #[error("could not create HTTP client: {0}")]
    Tls(String),
}

impl DeviceError {
    /// Whether the error is a transport-level failure (as opposed to a response from the TV).
    pub fn is_transport(&self) -> bool {
        matches!(self, DeviceError::Transport(_) | DeviceError::Timeout)
    }
}

// ================================================================================================
// Tests
