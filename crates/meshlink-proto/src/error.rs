//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding, framing, or decoding protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Attempted to encode an empty frame.
    #[error("cannot encode empty frame")]
    EmptyFrame,

    /// Frame exceeds the wire maximum.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Payload is too short for the structure it claims to carry.
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// A decoded frame failed structural validation. Carries the offending
    /// response code and the raw payload for forensic logging.
    #[error("parse failure for response 0x{code:02X}: {reason} ({} payload bytes)", payload.len())]
    Parse {
        /// Response code of the offending frame.
        code: u8,
        /// Raw payload bytes as received.
        payload: Vec<u8>,
        /// What went wrong.
        reason: String,
    },
}

impl ProtocolError {
    /// Wrap a structural failure with the frame it came from.
    pub fn parse(code: u8, payload: &[u8], reason: impl Into<String>) -> Self {
        ProtocolError::Parse {
            code,
            payload: payload.to_vec(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
