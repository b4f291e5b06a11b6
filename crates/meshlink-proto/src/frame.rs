//! The protocol frame value type.

use bytes::Bytes;

use crate::codes::{frame_kind, FrameKind};

/// One discrete protocol message: a code byte plus a payload.
///
/// Frames are immutable once built. Classification of a frame is a pure
/// function of its code byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command, response, or push code.
    pub code: u8,
    /// Payload bytes following the code byte. May be empty.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from a code and payload.
    pub fn new(code: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Create a code-only frame with an empty payload.
    pub fn code_only(code: u8) -> Self {
        Self {
            code,
            payload: Bytes::new(),
        }
    }

    /// Build a frame from raw inner bytes (code byte + payload).
    ///
    /// Returns `None` for empty input.
    pub fn from_inner(inner: &[u8]) -> Option<Self> {
        let (&code, payload) = inner.split_first()?;
        Some(Self {
            code,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// The raw inner bytes: code byte followed by the payload.
    pub fn to_inner(&self) -> Vec<u8> {
        let mut inner = Vec::with_capacity(1 + self.payload.len());
        inner.push(self.code);
        inner.extend_from_slice(&self.payload);
        inner
    }

    /// How this frame participates in request/response correlation.
    pub fn kind(&self) -> FrameKind {
        frame_kind(self.code)
    }

    /// Whether this is an unsolicited push notification.
    pub fn is_push(&self) -> bool {
        self.kind() == FrameKind::Push
    }

    /// Whether this is a status/ack frame.
    pub fn is_status(&self) -> bool {
        self.kind() == FrameKind::Status
    }
}
