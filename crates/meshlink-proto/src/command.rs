//! Outbound command encoding.

use crate::codes::*;
use crate::frame::Frame;
use crate::wire::ChannelInfo;

/// Number of reserved zero bytes in the app-start command, between the
/// protocol version and the app name.
pub const APP_START_RESERVED: usize = 6;

/// Commands the host sends to the companion firmware.
///
/// Each command encodes to an inner frame: the command code byte followed by
/// its arguments. Integer fields are little-endian on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query device information. First step of the identification handshake.
    DeviceQuery {
        /// Protocol version the app understands.
        app_version: u8,
    },

    /// Start the app connection; the firmware replies with self info.
    AppStart {
        /// Protocol version the app understands.
        app_version: u8,
        /// App name, NUL-terminated on the wire.
        app_name: String,
    },

    /// Get the list of contacts.
    GetContacts {
        /// Only return contacts modified after this time.
        since: Option<u32>,
    },

    /// Get the current device time.
    GetDeviceTime,

    /// Set the device time.
    SetDeviceTime {
        /// Unix timestamp in seconds.
        time_secs: u32,
    },

    /// Get battery voltage and storage info.
    GetBatteryAndStorage,

    /// Get channel information.
    GetChannel {
        /// Channel index.
        index: u8,
    },

    /// Set channel information.
    SetChannel {
        /// Channel to store.
        channel: ChannelInfo,
    },
}

impl Command {
    /// The command code for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::DeviceQuery { .. } => CMD_DEVICE_QUERY,
            Command::AppStart { .. } => CMD_APP_START,
            Command::GetContacts { .. } => CMD_GET_CONTACTS,
            Command::GetDeviceTime => CMD_GET_DEVICE_TIME,
            Command::SetDeviceTime { .. } => CMD_SET_DEVICE_TIME,
            Command::GetBatteryAndStorage => CMD_GET_BATT_AND_STORAGE,
            Command::GetChannel { .. } => CMD_GET_CHANNEL,
            Command::SetChannel { .. } => CMD_SET_CHANNEL,
        }
    }

    /// Encode the command to inner frame bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        buf.push(self.code());

        match self {
            Command::DeviceQuery { app_version } => {
                buf.push(*app_version);
            }

            Command::AppStart {
                app_version,
                app_name,
            } => {
                buf.push(*app_version);
                buf.extend_from_slice(&[0u8; APP_START_RESERVED]);
                buf.extend_from_slice(app_name.as_bytes());
                buf.push(0);
            }

            Command::GetContacts { since } => {
                if let Some(since) = since {
                    buf.extend_from_slice(&since.to_le_bytes());
                }
            }

            Command::GetDeviceTime => {}

            Command::SetDeviceTime { time_secs } => {
                buf.extend_from_slice(&time_secs.to_le_bytes());
            }

            Command::GetBatteryAndStorage => {}

            Command::GetChannel { index } => {
                buf.push(*index);
            }

            Command::SetChannel { channel } => {
                buf.push(channel.index);
                let mut name = [0u8; 32];
                let copy = channel.name.len().min(32);
                name[..copy].copy_from_slice(&channel.name.as_bytes()[..copy]);
                buf.extend_from_slice(&name);
                buf.extend_from_slice(&channel.secret);
            }
        }

        buf
    }

    /// Encode the command as a [`Frame`].
    pub fn to_frame(&self) -> Frame {
        let inner = self.encode();
        Frame::new(inner[0], inner[1..].to_vec())
    }
}
