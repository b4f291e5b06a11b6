//! Error types for transports and sessions.

use meshlink_proto::ProtocolError;
use thiserror::Error;

/// Errors raised by transport implementations.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The link is not established.
    #[error("transport not connected")]
    NotConnected,

    /// Connection attempt failed.
    #[error("failed to connect {target}: {reason}")]
    ConnectFailed {
        /// Port path or device address.
        target: String,
        /// Failure reason.
        reason: String,
    },

    /// The device does not expose the required service or characteristics.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Read-side failure; the link is considered lost.
    #[error("transport read error: {0}")]
    ReadError(String),

    /// Write-side failure.
    #[error("transport write error: {0}")]
    WriteError(String),

    /// The transport was disposed.
    #[error("transport disposed")]
    Disposed,
}

impl TransportError {
    /// Whether reconnecting may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransportError::NotConnected
                | TransportError::ConnectFailed { .. }
                | TransportError::ReadError(_)
                | TransportError::WriteError(_)
        )
    }
}

/// Errors raised by the session layer.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Waiting on a push code is structurally impossible: pushes are
    /// asynchronous events, never replies. This is a logic bug in the
    /// caller, not a transient condition.
    #[error("cannot wait on push code 0x{code:02X}")]
    WaitOnPushCode {
        /// The offending code.
        code: u8,
    },

    /// A waiter is already registered for this code. Single-flight per code
    /// is an invariant; a second registration is a logic bug in the caller.
    #[error("a waiter is already pending for response code 0x{code:02X}")]
    WaiterPending {
        /// The contested code.
        code: u8,
    },

    /// The session's transport is not connected.
    #[error("session not connected")]
    NotConnected,

    /// The session was disposed while the operation was outstanding.
    #[error("session closed")]
    Closed,

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode/decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether this error indicates a logic bug in the caller rather than a
    /// runtime condition.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            SessionError::WaitOnPushCode { .. } | SessionError::WaiterPending { .. }
        )
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_are_flagged() {
        assert!(SessionError::WaitOnPushCode { code: 0x80 }.is_usage_error());
        assert!(SessionError::WaiterPending { code: 0x05 }.is_usage_error());
        assert!(!SessionError::NotConnected.is_usage_error());
    }

    #[test]
    fn test_retriable_transport_errors() {
        assert!(TransportError::NotConnected.is_retriable());
        assert!(!TransportError::Disposed.is_retriable());
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: SessionError = ProtocolError::EmptyFrame.into();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
