//! Wire protocol for MeshCore companion radios
//!
//! This crate implements the byte-level protocol spoken by MeshCore
//! companion firmware: the frame model, the framing codecs for BLE and
//! serial transports, outbound command encoding, and decoding of the
//! response payloads the session layer consumes.
//!
//! # Protocol Overview
//!
//! Every message is a frame: a single code byte followed by a payload.
//! The code byte partitions the frame space:
//!
//! - **Commands** (host → firmware): `CMD_*` codes
//! - **Responses** (firmware → host): `RESP_CODE_*` codes in `0x00..=0x7F`,
//!   with `0x01` reserved for status/ack frames
//! - **Push notifications** (firmware → host): `PUSH_CODE_*` codes with the
//!   high bit set (`0x80..`)
//!
//! Over BLE each notification carries exactly one frame. Over serial an
//! outer framing layer adds a direction marker and a little-endian length
//! prefix; see [`codec::SerialFraming`] for the resynchronization rules.
//!
//! # Example
//!
//! ```rust
//! use meshlink_proto::{Command, BleFraming, Framing};
//!
//! // Build the first handshake command and frame it for BLE.
//! let cmd = Command::DeviceQuery { app_version: 3 };
//! let codec = BleFraming::new();
//! let bytes = codec.encode(&cmd.to_frame()).unwrap();
//! assert_eq!(bytes, vec![0x16, 3]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codec;
pub mod codes;
pub mod command;
pub mod error;
pub mod frame;
pub mod wire;

pub use codec::{BleFraming, Framing, SerialFraming, SERIAL_MARKER_INBOUND, SERIAL_MARKER_OUTBOUND};
pub use codes::{frame_kind, is_push_code, is_status_code, FrameKind};
pub use command::Command;
pub use error::{ProtocolError, Result};
pub use frame::Frame;
pub use wire::{
    BatteryAndStorage, ChannelInfo, Contact, ContactListEnd, DeviceFirmwareInfo, SelfInfo,
};
