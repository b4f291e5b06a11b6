//! Bridge error taxonomy.
//!
//! `ErrorKind` classifies what went wrong independently of the component
//! that raised it; UI layers only ever see the kind and message carried in
//! the terminal `ConnectionResult`, never internal error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshlink_session::{SessionError, TransportError};

/// Failure classification for command and connection results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Single-flight rejection: an attempt is already running. A no-op
    /// signal, not a failure.
    ConnectionInProgress,
    /// No device link.
    DeviceNotConnected,
    /// The protocol handshake has not completed yet.
    ProtocolNotReady,
    /// Required collaborator (engine, radio stack) is unavailable.
    NetworkUnavailable,
    /// Required service or characteristic missing: the classification was
    /// wrong or the device is non-conformant.
    UnsupportedDevice,
    /// The identification handshake failed.
    IdentificationFailed,
    /// A wait expired.
    Timeout,
    /// Transport-level failure.
    CommunicationError,
    /// A decoded frame failed structural validation.
    ParseFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConnectionInProgress => "connection in progress",
            ErrorKind::DeviceNotConnected => "device not connected",
            ErrorKind::ProtocolNotReady => "protocol not ready",
            ErrorKind::NetworkUnavailable => "network unavailable",
            ErrorKind::UnsupportedDevice => "unsupported device",
            ErrorKind::IdentificationFailed => "identification failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CommunicationError => "communication error",
            ErrorKind::ParseFailure => "parse failure",
        };
        write!(f, "{name}")
    }
}

/// A classified command failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CommandError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Failure description.
    pub message: String,
}

impl CommandError {
    /// Build a classified failure.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A timed-out wait.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// No usable device link.
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeviceNotConnected, message)
    }
}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        let kind = match &err {
            SessionError::NotConnected | SessionError::Closed => ErrorKind::DeviceNotConnected,
            SessionError::Transport(_) => ErrorKind::CommunicationError,
            SessionError::Protocol(_) => ErrorKind::ParseFailure,
            SessionError::WaitOnPushCode { .. } | SessionError::WaiterPending { .. } => {
                ErrorKind::CommunicationError
            }
        };
        Self::new(kind, err.to_string())
    }
}

impl From<TransportError> for CommandError {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::UnsupportedDevice(_) => ErrorKind::UnsupportedDevice,
            TransportError::NotConnected | TransportError::Disposed => {
                ErrorKind::DeviceNotConnected
            }
            _ => ErrorKind::CommunicationError,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result type alias for adapter commands.
pub type CommandResult<T> = std::result::Result<T, CommandError>;
