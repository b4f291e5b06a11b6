//! Shared bridge types: discovered devices, detection results, connection
//! state, and the protocol-agnostic device summary.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meshlink_session::TransportKind;

use crate::adapter::DeviceAdapter;
use crate::error::ErrorKind;

/// Which wire protocol a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// MeshCore companion protocol (frame codec + session driven here).
    MeshCore,
    /// Meshtastic, driven through an externally-owned engine.
    Meshtastic,
    /// Could not be classified from the advertisement.
    Unknown,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::MeshCore => write!(f, "meshcore"),
            Protocol::Meshtastic => write!(f, "meshtastic"),
            Protocol::Unknown => write!(f, "unknown"),
        }
    }
}

/// A device reported by the platform scan layer. Consumed read-only.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Platform device identifier.
    pub id: String,
    /// Advertised device name, when present.
    pub name: Option<String>,
    /// Transport the device was discovered on.
    pub transport: TransportKind,
    /// Hardware address or port path, when known.
    pub address: Option<String>,
    /// Signal strength at scan time.
    pub rssi: Option<i16>,
    /// Advertised GATT service identifiers.
    pub service_uuids: Vec<Uuid>,
    /// Advertisement manufacturer data, keyed by company identifier.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl DiscoveredDevice {
    /// Whether the advertisement carries `service`.
    pub fn advertises_service(&self, service: Uuid) -> bool {
        self.service_uuids.contains(&service)
    }
}

impl Default for DiscoveredDevice {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: None,
            transport: TransportKind::Ble,
            address: None,
            rssi: None,
            service_uuids: Vec::new(),
            manufacturer_data: HashMap::new(),
        }
    }
}

/// Result of protocol classification. Pure output of the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDetection {
    /// The classified protocol.
    pub protocol: Protocol,
    /// Classification confidence, 0.0-1.0. Informational only: any
    /// non-unknown result is treated as authoritative and locked.
    pub confidence: f32,
    /// Human-readable reason for the classification.
    pub reason: String,
}

impl ProtocolDetection {
    /// A failed classification.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Unknown,
            confidence: 0.0,
            reason: reason.into(),
        }
    }
}

/// Connection lifecycle state, published exclusively by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// Attempt started; transport being established.
    Connecting,
    /// Link up; identification handshake running.
    Identifying,
    /// Identified and usable.
    Connected,
    /// Teardown in progress.
    Disconnecting,
    /// The last attempt failed.
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Identifying => write!(f, "identifying"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Protocol-agnostic summary of an identified device, assembled by each
/// adapter from its protocol-specific identification response. Handed to
/// storage/UI layers as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDeviceInfo {
    /// Protocol the device speaks.
    pub protocol: Protocol,
    /// Display name.
    pub name: String,
    /// Node identifier, when the protocol assigns one.
    pub node_id: Option<String>,
    /// Firmware version string, when known.
    pub firmware_version: Option<String>,
    /// Hardware or build description, when known.
    pub hardware: Option<String>,
}

/// Terminal, immutable value describing one connection attempt.
#[derive(Clone)]
pub struct ConnectionResult {
    /// Whether the attempt reached the connected state.
    pub success: bool,
    /// The adapter driving the device, on success.
    pub adapter: Option<Arc<dyn DeviceAdapter>>,
    /// Identified device, on success.
    pub device: Option<MeshDeviceInfo>,
    /// Failure classification, on failure.
    pub error_kind: Option<ErrorKind>,
    /// Failure description, on failure.
    pub error_message: Option<String>,
}

impl std::fmt::Debug for ConnectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResult")
            .field("success", &self.success)
            .field("device", &self.device)
            .field("error_kind", &self.error_kind)
            .field("error_message", &self.error_message)
            .finish()
    }
}

impl ConnectionResult {
    /// Successful attempt.
    pub fn connected(device: MeshDeviceInfo, adapter: Arc<dyn DeviceAdapter>) -> Self {
        Self {
            success: true,
            adapter: Some(adapter),
            device: Some(device),
            error_kind: None,
            error_message: None,
        }
    }

    /// Failed attempt.
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            adapter: None,
            device: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    /// Single-flight rejection: another attempt is already running. Not a
    /// failure, a no-op signal.
    pub fn already_connecting() -> Self {
        Self::failed(
            ErrorKind::ConnectionInProgress,
            "a connection attempt is already in progress",
        )
    }

    /// Whether this is the single-flight rejection.
    pub fn is_already_connecting(&self) -> bool {
        self.error_kind == Some(ErrorKind::ConnectionInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Identifying.to_string(), "identifying");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }

    #[test]
    fn test_already_connecting_is_not_success() {
        let result = ConnectionResult::already_connecting();
        assert!(!result.success);
        assert!(result.is_already_connecting());
    }

    #[test]
    fn test_connected_result_carries_device_and_adapter() {
        use crate::error::CommandResult;
        use async_trait::async_trait;
        use std::time::Duration;

        struct NullAdapter;

        #[async_trait]
        impl DeviceAdapter for NullAdapter {
            fn protocol(&self) -> Protocol {
                Protocol::MeshCore
            }
            fn is_ready(&self) -> bool {
                true
            }
            async fn identify(&self) -> CommandResult<MeshDeviceInfo> {
                unreachable!()
            }
            async fn ping(&self) -> CommandResult<Duration> {
                unreachable!()
            }
            async fn disconnect(&self) {}
            async fn dispose(&self) {}
        }

        let info = MeshDeviceInfo {
            protocol: Protocol::MeshCore,
            name: "Summit Relay".to_string(),
            node_id: Some("42a1".to_string()),
            firmware_version: None,
            hardware: None,
        };
        let result = ConnectionResult::connected(info.clone(), Arc::new(NullAdapter));
        assert!(result.success);
        assert_eq!(result.device, Some(info));
        assert!(result.adapter.is_some());
        assert!(result.error_kind.is_none());
    }

    #[test]
    fn test_advertises_service() {
        let service = Uuid::from_u128(0x1234);
        let device = DiscoveredDevice {
            service_uuids: vec![service],
            ..Default::default()
        };
        assert!(device.advertises_service(service));
        assert!(!device.advertises_service(Uuid::from_u128(0x9999)));
    }
}
