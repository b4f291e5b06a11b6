//! Decoded wire structures
//!
//! Payload decoders for the responses the session consumes. Decoded
//! structures are plain data: they cross the API boundary to storage and UI
//! layers, so they carry serde derives, and a parse failure surfaces the
//! offending response code with the raw payload bytes for forensic logging.
//!
//! All multi-byte integers are little-endian on the wire. Fixed-width string
//! fields are NUL-padded.

use serde::{Deserialize, Serialize};

use crate::codes::{
    MAX_PATH_SIZE, PUB_KEY_SIZE, RESP_CODE_BATT_AND_STORAGE, RESP_CODE_CHANNEL_INFO,
    RESP_CODE_CONTACT, RESP_CODE_CURR_TIME, RESP_CODE_DEVICE_INFO, RESP_CODE_END_OF_CONTACTS,
    RESP_CODE_SELF_INFO, SELF_INFO_MIN_LEN,
};
use crate::error::{ProtocolError, Result};

fn read_u16(data: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([data[i], data[i + 1]])
}

fn read_u32(data: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
}

fn read_i32(data: &[u8], i: usize) -> i32 {
    i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
}

/// Decode a fixed-width NUL-padded string field.
fn read_str(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// The device's own identity and radio configuration, returned by the
/// identification handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfInfo {
    /// Advertisement type (chat node, repeater, room server).
    pub advert_type: u8,
    /// Current TX power in dBm.
    pub tx_power_dbm: u8,
    /// Maximum TX power in dBm.
    pub max_tx_power_dbm: u8,
    /// Node public key.
    pub public_key: [u8; PUB_KEY_SIZE],
    /// Advertised latitude in microdegrees.
    pub gps_lat: i32,
    /// Advertised longitude in microdegrees.
    pub gps_lon: i32,
    /// Multi-ACK count.
    pub multi_acks: u8,
    /// Advertisement location policy.
    pub advert_loc_policy: u8,
    /// Telemetry mode flags.
    pub telemetry_modes: u8,
    /// Manual contact-add flag.
    pub manual_add_contacts: u8,
    /// Radio frequency in kHz.
    pub freq_khz: u32,
    /// Radio bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// LoRa spreading factor.
    pub spreading_factor: u8,
    /// LoRa coding rate.
    pub coding_rate: u8,
    /// Node display name.
    pub node_name: String,
}

impl SelfInfo {
    /// Decode a self-info payload.
    ///
    /// The fixed head (advert type, power levels, public key) is mandatory;
    /// location, policy, and radio fields are parsed when present, and the
    /// node name is the trailing bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SELF_INFO_MIN_LEN {
            return Err(ProtocolError::parse(
                RESP_CODE_SELF_INFO,
                data,
                format!("need at least {SELF_INFO_MIN_LEN} bytes"),
            ));
        }

        let mut info = SelfInfo {
            advert_type: data[0],
            tx_power_dbm: data[1],
            max_tx_power_dbm: data[2],
            ..Default::default()
        };
        info.public_key.copy_from_slice(&data[3..3 + PUB_KEY_SIZE]);
        let mut i = SELF_INFO_MIN_LEN;

        if data.len() >= i + 8 {
            info.gps_lat = read_i32(data, i);
            info.gps_lon = read_i32(data, i + 4);
            i += 8;
        }
        if data.len() >= i + 4 {
            info.multi_acks = data[i];
            info.advert_loc_policy = data[i + 1];
            info.telemetry_modes = data[i + 2];
            info.manual_add_contacts = data[i + 3];
            i += 4;
        }
        if data.len() >= i + 10 {
            info.freq_khz = read_u32(data, i);
            info.bandwidth_hz = read_u32(data, i + 4);
            info.spreading_factor = data[i + 8];
            info.coding_rate = data[i + 9];
            i += 10;
        }

        info.node_name = read_str(&data[i..]);
        Ok(info)
    }
}

/// Firmware build information, returned by the device query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFirmwareInfo {
    /// Firmware protocol version code.
    pub firmware_version_code: u8,
    /// Half the maximum contact count.
    pub max_contacts_half: u8,
    /// Maximum number of group channels.
    pub max_group_channels: u8,
    /// BLE pairing PIN.
    pub ble_pin: u32,
    /// Firmware build date.
    pub build_date: String,
    /// Hardware manufacturer/model string.
    pub manufacturer: String,
    /// Firmware version string.
    pub firmware_version: String,
}

impl DeviceFirmwareInfo {
    /// Minimum payload: version fields, pin, and the three fixed-width
    /// string fields (12 + 40 + 20 bytes).
    pub const MIN_LEN: usize = 1 + 1 + 1 + 4 + 12 + 40 + 20;

    /// Decode a device-info payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(ProtocolError::parse(
                RESP_CODE_DEVICE_INFO,
                data,
                format!("need at least {} bytes", Self::MIN_LEN),
            ));
        }

        Ok(DeviceFirmwareInfo {
            firmware_version_code: data[0],
            max_contacts_half: data[1],
            max_group_channels: data[2],
            ble_pin: read_u32(data, 3),
            build_date: read_str(&data[7..19]),
            manufacturer: read_str(&data[19..59]),
            firmware_version: read_str(&data[59..79]),
        })
    }
}

/// One known contact on the mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact public key.
    pub public_key: [u8; PUB_KEY_SIZE],
    /// Contact type (chat node, repeater, room server).
    pub contact_type: u8,
    /// Contact flags.
    pub flags: u8,
    /// Known outbound routing path, most recent hop first. Empty when the
    /// path is unknown (flood routing).
    pub out_path: Vec<u8>,
    /// Contact display name.
    pub name: String,
    /// Timestamp of the last received advertisement.
    pub last_advert_timestamp: u32,
    /// Latitude in microdegrees, if shared.
    pub gps_lat: i32,
    /// Longitude in microdegrees, if shared.
    pub gps_lon: i32,
    /// Last modification timestamp.
    pub lastmod: u32,
}

impl Contact {
    /// Minimum payload: key, type/flags/path-len, fixed path field, fixed
    /// name field, last advert timestamp.
    pub const MIN_LEN: usize = PUB_KEY_SIZE + 3 + MAX_PATH_SIZE + 32 + 4;

    /// Decode a contact payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(ProtocolError::parse(
                RESP_CODE_CONTACT,
                data,
                format!("need at least {} bytes", Self::MIN_LEN),
            ));
        }

        let mut contact = Contact::default();
        let mut i = 0;

        contact.public_key.copy_from_slice(&data[i..i + PUB_KEY_SIZE]);
        i += PUB_KEY_SIZE;

        contact.contact_type = data[i];
        contact.flags = data[i + 1];
        let out_path_len = data[i + 2] as i8;
        i += 3;

        // The path field is fixed-width; only the first `out_path_len`
        // bytes are meaningful. Negative means no known path.
        if out_path_len > 0 {
            let take = (out_path_len as usize).min(MAX_PATH_SIZE);
            contact.out_path = data[i..i + take].to_vec();
        }
        i += MAX_PATH_SIZE;

        contact.name = read_str(&data[i..i + 32]);
        i += 32;

        contact.last_advert_timestamp = read_u32(data, i);
        i += 4;

        if data.len() >= i + 8 {
            contact.gps_lat = read_i32(data, i);
            contact.gps_lon = read_i32(data, i + 4);
            i += 8;

            if data.len() >= i + 4 {
                contact.lastmod = read_u32(data, i);
            }
        }

        Ok(contact)
    }
}

/// Totals reported at the end of a contact list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactListEnd {
    /// Most recent contact modification timestamp.
    pub most_recent_lastmod: u32,
}

impl ContactListEnd {
    /// Decode an end-of-contacts payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(ProtocolError::parse(
                RESP_CODE_END_OF_CONTACTS,
                data,
                "need at least 4 bytes",
            ));
        }
        Ok(ContactListEnd {
            most_recent_lastmod: read_u32(data, 0),
        })
    }
}

/// A group channel: index, display name, and shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel index.
    pub index: u8,
    /// Channel display name.
    pub name: String,
    /// Shared channel secret.
    pub secret: [u8; 16],
}

impl ChannelInfo {
    /// Payload length: index + 32-byte name field + 16-byte secret.
    pub const MIN_LEN: usize = 1 + 32 + 16;

    /// Decode a channel-info payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(ProtocolError::parse(
                RESP_CODE_CHANNEL_INFO,
                data,
                format!("need at least {} bytes", Self::MIN_LEN),
            ));
        }

        let mut secret = [0u8; 16];
        secret.copy_from_slice(&data[33..49]);

        Ok(ChannelInfo {
            index: data[0],
            name: read_str(&data[1..33]),
            secret,
        })
    }
}

/// Battery voltage and storage usage. The cheapest always-available metric,
/// used as the keep-alive probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryAndStorage {
    /// Battery voltage in millivolts.
    pub battery_millivolts: u16,
    /// Used storage in kilobytes.
    pub storage_used_kb: u32,
    /// Total storage in kilobytes.
    pub storage_total_kb: u32,
}

impl BatteryAndStorage {
    /// Payload length: voltage + used + total.
    pub const MIN_LEN: usize = 2 + 4 + 4;

    /// Decode a battery-and-storage payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(ProtocolError::parse(
                RESP_CODE_BATT_AND_STORAGE,
                data,
                format!("need at least {} bytes", Self::MIN_LEN),
            ));
        }
        Ok(BatteryAndStorage {
            battery_millivolts: read_u16(data, 0),
            storage_used_kb: read_u32(data, 2),
            storage_total_kb: read_u32(data, 6),
        })
    }
}

/// Decode a current-time payload into a unix timestamp.
pub fn decode_current_time(data: &[u8]) -> Result<u32> {
    if data.len() < 4 {
        return Err(ProtocolError::parse(
            RESP_CODE_CURR_TIME,
            data,
            "need at least 4 bytes",
        ));
    }
    Ok(read_u32(data, 0))
}
