//! Framing codecs
//!
//! Two codecs share the [`Frame`] output type:
//!
//! - [`BleFraming`] - BLE notifications arrive already segmented; each
//!   notification is exactly one inner frame. Loss is a dropped frame, not a
//!   corrupted stream, so no resynchronization is needed.
//! - [`SerialFraming`] - byte-stream reassembly over serial/USB with an
//!   outer framing layer:
//!
//! ```text
//! +--------+--------+--------+-------------------+
//! | marker | len_lo | len_hi | inner[0..len]     |
//! +--------+--------+--------+-------------------+
//! ```
//!
//! The marker is `0x3E` for device→host frames and `0x3C` for host→device
//! frames. The length is little-endian and covers the inner frame (code byte
//! plus payload). The decoder scans past garbage to the inbound marker and
//! recovers from corrupt length fields by dropping a single byte and
//! rescanning.

use bytes::{Buf, BytesMut};
use std::collections::VecDeque;
use tracing::{trace, warn};

use crate::codes::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{ProtocolError, Result};
use crate::frame::Frame;

/// Marker byte for device→host serial frames.
pub const SERIAL_MARKER_INBOUND: u8 = 0x3E;
/// Marker byte for host→device serial frames.
pub const SERIAL_MARKER_OUTBOUND: u8 = 0x3C;
/// Outer framing header: marker + 2-byte length.
pub const SERIAL_HEADER_LEN: usize = 3;

/// Receive buffer cap. A peer that streams bytes without ever completing a
/// frame must not cause unbounded growth; past this point the buffer is
/// cleared wholesale.
const RESYNC_BUFFER_CAP: usize = 2 * (SERIAL_HEADER_LEN + MAX_FRAME_SIZE);

/// Converts a raw byte stream into discrete frames and back.
///
/// `feed` accepts raw transport bytes; `try_decode` yields the next complete
/// frame, or `None` when more bytes are needed. Implementations own whatever
/// reassembly state the transport requires.
pub trait Framing: Send + Sync {
    /// Encode a frame into raw transport bytes.
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>>;

    /// Add received transport bytes to the reassembly state.
    fn feed(&mut self, chunk: &[u8]);

    /// Try to extract the next complete frame.
    fn try_decode(&mut self) -> Option<Frame>;
}

// ============================================================================
// BLE
// ============================================================================

/// Framing for BLE transports.
///
/// The link layer already segments the stream: every notification carries one
/// complete inner frame (code byte + payload).
#[derive(Debug, Default)]
pub struct BleFraming {
    pending: VecDeque<Vec<u8>>,
}

impl BleFraming {
    /// Create a new BLE framing codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Framing for BleFraming {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_PAYLOAD_SIZE,
                actual: frame.payload.len(),
            });
        }
        Ok(frame.to_inner())
    }

    fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            trace!("dropping empty notification");
            return;
        }
        self.pending.push_back(chunk.to_vec());
    }

    fn try_decode(&mut self) -> Option<Frame> {
        while let Some(chunk) = self.pending.pop_front() {
            if let Some(frame) = Frame::from_inner(&chunk) {
                return Some(frame);
            }
        }
        None
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Framing for serial/USB transports.
///
/// Maintains an accumulation buffer across reads. Garbage or partial frames
/// left over from a previous session are skipped by scanning to the inbound
/// marker; corrupt length fields are recovered from by dropping one byte and
/// rescanning, so a hostile byte stream cannot wedge the decoder.
#[derive(Debug, Default)]
pub struct SerialFraming {
    buffer: BytesMut,
}

impl SerialFraming {
    /// Create a new serial framing codec.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(RESYNC_BUFFER_CAP),
        }
    }

    /// Encode raw inner frame bytes with the outbound header.
    ///
    /// Rejects empty and oversized inner frames rather than truncating.
    pub fn encode_inner(inner: &[u8]) -> Result<Vec<u8>> {
        if inner.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if inner.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: inner.len(),
            });
        }
        let mut out = Vec::with_capacity(SERIAL_HEADER_LEN + inner.len());
        out.push(SERIAL_MARKER_OUTBOUND);
        out.extend_from_slice(&(inner.len() as u16).to_le_bytes());
        out.extend_from_slice(inner);
        Ok(out)
    }

    /// Number of bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Skip to the next inbound marker, discarding garbage.
    fn scan_to_marker(&mut self) {
        let mut discarded = 0usize;
        while !self.buffer.is_empty() && self.buffer[0] != SERIAL_MARKER_INBOUND {
            self.buffer.advance(1);
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "discarded bytes before frame marker");
        }
    }
}

impl Framing for SerialFraming {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        Self::encode_inner(&frame.to_inner())
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > RESYNC_BUFFER_CAP {
            warn!(
                discarded = self.buffer.len(),
                "receive buffer overflowed without a complete frame, clearing"
            );
            self.buffer.clear();
        }
    }

    fn try_decode(&mut self) -> Option<Frame> {
        loop {
            self.scan_to_marker();

            if self.buffer.len() < SERIAL_HEADER_LEN {
                return None;
            }

            let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
            if len == 0 || len > MAX_FRAME_SIZE {
                // Corrupt length: this marker byte was not a real frame
                // start. Drop it and rescan.
                warn!(len, "invalid frame length, resynchronizing");
                self.buffer.advance(1);
                continue;
            }

            if self.buffer.len() < SERIAL_HEADER_LEN + len {
                trace!(
                    have = self.buffer.len(),
                    need = SERIAL_HEADER_LEN + len,
                    "waiting for complete frame"
                );
                return None;
            }

            self.buffer.advance(SERIAL_HEADER_LEN);
            let inner = self.buffer.split_to(len);
            match Frame::from_inner(&inner) {
                Some(frame) => return Some(frame),
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::RESP_CODE_SELF_INFO;

    /// Encode a frame as the device would send it (inbound marker).
    fn encode_as_device(inner: &[u8]) -> Vec<u8> {
        let mut out = vec![SERIAL_MARKER_INBOUND];
        out.extend_from_slice(&(inner.len() as u16).to_le_bytes());
        out.extend_from_slice(inner);
        out
    }

    #[test]
    fn test_ble_notification_is_one_frame() {
        let mut codec = BleFraming::new();
        codec.feed(&[RESP_CODE_SELF_INFO, 0x01, 0x02]);
        let frame = codec.try_decode().expect("should decode frame");
        assert_eq!(frame.code, RESP_CODE_SELF_INFO);
        assert_eq!(frame.payload.as_ref(), &[0x01, 0x02]);
        assert!(codec.try_decode().is_none());
    }

    #[test]
    fn test_ble_empty_notification_dropped() {
        let mut codec = BleFraming::new();
        codec.feed(&[]);
        assert!(codec.try_decode().is_none());
    }

    #[test]
    fn test_ble_encode_rejects_oversized_payload() {
        let codec = BleFraming::new();
        let frame = Frame::new(0x02, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            codec.encode(&frame),
            Err(ProtocolError::FrameTooLong { .. })
        ));
    }

    #[test]
    fn test_serial_round_trip_all_payload_lengths() {
        for len in 1..=MAX_PAYLOAD_SIZE {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = Frame::new(0x03, payload.clone());

            let encoded = SerialFraming::new().encode(&frame).unwrap();
            assert_eq!(encoded[0], SERIAL_MARKER_OUTBOUND);

            // Feed the device-direction equivalent into a decoder.
            let mut codec = SerialFraming::new();
            codec.feed(&encode_as_device(&frame.to_inner()));
            let decoded = codec.try_decode().expect("should decode frame");
            assert_eq!(decoded.code, 0x03);
            assert_eq!(decoded.payload.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn test_serial_partial_frame_waits_for_more() {
        let frame = Frame::new(0x09, vec![0xAA; 16]);
        let bytes = encode_as_device(&frame.to_inner());

        let mut codec = SerialFraming::new();
        codec.feed(&bytes[..5]);
        assert!(codec.try_decode().is_none());

        codec.feed(&bytes[5..]);
        assert_eq!(codec.try_decode().unwrap(), frame);
    }

    #[test]
    fn test_serial_skips_garbage_before_marker() {
        let frame = Frame::new(0x0C, vec![1, 2, 3, 4]);
        let mut codec = SerialFraming::new();
        codec.feed(&[0x00, 0x17, 0xFF, 0x42]);
        codec.feed(&encode_as_device(&frame.to_inner()));
        assert_eq!(codec.try_decode().unwrap(), frame);
    }

    #[test]
    fn test_serial_recovers_from_invalid_length() {
        let frame = Frame::new(0x05, vec![7; 40]);
        let mut codec = SerialFraming::new();

        // Marker followed by an impossible length must not wedge the
        // decoder; it drops a byte and rescans.
        codec.feed(&[SERIAL_MARKER_INBOUND, 0xFF, 0xFF]);
        codec.feed(&encode_as_device(&frame.to_inner()));
        assert_eq!(codec.try_decode().unwrap(), frame);
    }

    #[test]
    fn test_serial_zero_length_is_invalid() {
        let frame = Frame::new(0x05, vec![9; 8]);
        let mut codec = SerialFraming::new();
        codec.feed(&[SERIAL_MARKER_INBOUND, 0x00, 0x00]);
        codec.feed(&encode_as_device(&frame.to_inner()));
        assert_eq!(codec.try_decode().unwrap(), frame);
    }

    #[test]
    fn test_serial_multiple_frames_in_one_feed() {
        let first = Frame::new(0x03, vec![1; 10]);
        let second = Frame::new(0x03, vec![2; 20]);

        let mut bytes = encode_as_device(&first.to_inner());
        bytes.extend_from_slice(&encode_as_device(&second.to_inner()));

        let mut codec = SerialFraming::new();
        codec.feed(&bytes);
        assert_eq!(codec.try_decode().unwrap(), first);
        assert_eq!(codec.try_decode().unwrap(), second);
        assert!(codec.try_decode().is_none());
    }

    #[test]
    fn test_serial_buffer_cap_clears_runaway_stream() {
        let mut codec = SerialFraming::new();

        // A "frame" that claims the maximum length but never completes,
        // padded with garbage that contains no marker.
        codec.feed(&[SERIAL_MARKER_INBOUND, 0xFB, 0x00]);
        for _ in 0..40 {
            codec.feed(&[0x11; 16]);
        }
        assert!(codec.buffered_len() <= 2 * (SERIAL_HEADER_LEN + MAX_FRAME_SIZE));

        // The codec keeps working after the purge.
        let frame = Frame::new(0x09, vec![3; 5]);
        codec.feed(&encode_as_device(&frame.to_inner()));
        assert_eq!(codec.try_decode().unwrap(), frame);
    }

    #[test]
    fn test_serial_encode_rejects_empty_inner() {
        assert!(matches!(
            SerialFraming::encode_inner(&[]),
            Err(ProtocolError::EmptyFrame)
        ));
    }

    #[test]
    fn test_serial_encode_rejects_oversized_inner() {
        let inner = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            SerialFraming::encode_inner(&inner),
            Err(ProtocolError::FrameTooLong { .. })
        ));
    }

    #[test]
    fn test_serial_encode_header_layout() {
        let encoded = SerialFraming::encode_inner(&[0x16, 0x08]).unwrap();
        assert_eq!(encoded, vec![SERIAL_MARKER_OUTBOUND, 0x02, 0x00, 0x16, 0x08]);
    }
}
