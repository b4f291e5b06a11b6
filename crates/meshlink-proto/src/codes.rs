//! Protocol code tables
//!
//! These constants define the command codes, response codes, and push codes
//! used by the MeshCore companion protocol. The code byte at the start of
//! every frame partitions the frame space:
//!
//! - `0x00..=0x7F` - responses and status frames (firmware → host, solicited)
//! - `0x80..=0xFF` - push notifications (firmware → host, unsolicited)
//!
//! Classification is a pure function of the code byte; see [`frame_kind`].

// ============================================================================
// Command Codes (host → firmware)
// ============================================================================

/// Initial handshake command - starts the app connection.
pub const CMD_APP_START: u8 = 0x01;
/// Send a text message to a contact.
pub const CMD_SEND_TXT_MSG: u8 = 0x02;
/// Get the list of contacts (with optional 'since' filter).
pub const CMD_GET_CONTACTS: u8 = 0x04;
/// Get the current device time.
pub const CMD_GET_DEVICE_TIME: u8 = 0x05;
/// Set the device time.
pub const CMD_SET_DEVICE_TIME: u8 = 0x06;
/// Get battery voltage and storage info.
pub const CMD_GET_BATT_AND_STORAGE: u8 = 0x14;
/// Query device information. First command of the identification handshake.
pub const CMD_DEVICE_QUERY: u8 = 0x16;
/// Get channel information.
pub const CMD_GET_CHANNEL: u8 = 0x1F;
/// Set channel information.
pub const CMD_SET_CHANNEL: u8 = 0x20;

// ============================================================================
// Response Codes (firmware → host)
// ============================================================================

/// Generic OK response.
pub const RESP_CODE_OK: u8 = 0x00;
/// Status/acknowledgement frame. Answers "command accepted", never carries
/// request data; must not be mistaken for a data response.
pub const RESP_CODE_ACK: u8 = 0x01;
/// Start of contacts list.
pub const RESP_CODE_CONTACTS_START: u8 = 0x02;
/// A single contact entry.
pub const RESP_CODE_CONTACT: u8 = 0x03;
/// End of contacts list.
pub const RESP_CODE_END_OF_CONTACTS: u8 = 0x04;
/// Self info response (reply to the app-start handshake).
pub const RESP_CODE_SELF_INFO: u8 = 0x05;
/// Current time response.
pub const RESP_CODE_CURR_TIME: u8 = 0x09;
/// Battery and storage info.
pub const RESP_CODE_BATT_AND_STORAGE: u8 = 0x0C;
/// Device firmware info response.
pub const RESP_CODE_DEVICE_INFO: u8 = 0x0D;
/// Channel info response.
pub const RESP_CODE_CHANNEL_INFO: u8 = 0x12;

// ============================================================================
// Push Codes (unsolicited firmware → host)
// ============================================================================

/// Advertisement received.
pub const PUSH_CODE_ADVERT: u8 = 0x80;
/// Path to a contact was updated.
pub const PUSH_CODE_PATH_UPDATED: u8 = 0x81;
/// Message send confirmed (ACK received over the air).
pub const PUSH_CODE_SEND_CONFIRMED: u8 = 0x82;
/// Message waiting in the offline queue.
pub const PUSH_CODE_MSG_WAITING: u8 = 0x83;

// ============================================================================
// Sizes
// ============================================================================

/// Size of a node public key in bytes.
pub const PUB_KEY_SIZE: usize = 32;
/// Maximum routing path size in bytes.
pub const MAX_PATH_SIZE: usize = 64;
/// Maximum payload size (frame bytes after the code byte).
pub const MAX_PAYLOAD_SIZE: usize = 250;
/// Maximum inner frame size (code byte + payload).
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD_SIZE + 1;
/// Minimum self-info payload length: advert type, tx power levels, and the
/// node public key. Anything shorter is a truncated or spoofed response.
pub const SELF_INFO_MIN_LEN: usize = 3 + PUB_KEY_SIZE;

/// How a frame participates in request/response correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Reply to a specific prior request; eligible to satisfy a waiter.
    Response,
    /// Command-accepted acknowledgement; never satisfies a waiter.
    Status,
    /// Unsolicited asynchronous event; never satisfies a waiter.
    Push,
}

/// Whether `code` is a push code (unsolicited event).
#[inline]
pub fn is_push_code(code: u8) -> bool {
    code & 0x80 != 0
}

/// Whether `code` is the status/ack code.
#[inline]
pub fn is_status_code(code: u8) -> bool {
    code == RESP_CODE_ACK
}

/// Classify a frame code. Pure function of the code byte.
pub fn frame_kind(code: u8) -> FrameKind {
    if is_push_code(code) {
        FrameKind::Push
    } else if is_status_code(code) {
        FrameKind::Status
    } else {
        FrameKind::Response
    }
}
