//! Transport contract
//!
//! A [`Transport`] is a byte pipe over BLE or serial hardware: it reports
//! link-state transitions, exposes the raw inbound byte stream, and accepts
//! raw outbound buffers. The session layer never talks to platform BLE or
//! serial APIs directly - only through this contract, which is what lets
//! tests substitute an in-memory transport.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::TransportError;

/// GATT service identifier advertised by MeshCore companion radios
/// (Nordic-UART-style service).
pub const MESHCORE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Capacity of the state and inbound-byte broadcast channels.
pub(crate) const BROADCAST_CAPACITY: usize = 64;

/// Physical transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Bluetooth Low Energy (GATT write + notify).
    Ble,
    /// Serial/USB byte stream.
    Serial,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Ble => write!(f, "ble"),
            TransportKind::Serial => write!(f, "serial"),
        }
    }
}

/// Link-level connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not connected.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Link established, bytes can flow.
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Byte-pipe abstraction over BLE or serial hardware.
///
/// Methods take `&self`: implementations use interior mutability so the
/// session's read loop and the caller's write path can share one handle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the link.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Release all resources. The transport is unusable afterwards.
    async fn dispose(&self);

    /// Current link state.
    fn state(&self) -> LinkState;

    /// Subscribe to link-state transitions. Subscribers attached before a
    /// transition observe it; late subscribers only see future transitions.
    fn subscribe_state(&self) -> broadcast::Receiver<LinkState>;

    /// Subscribe to the raw inbound byte stream.
    fn subscribe_bytes(&self) -> broadcast::Receiver<Bytes>;

    /// Write a raw outbound buffer.
    async fn send_bytes(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Physical transport kind; selects the framing codec.
    fn kind(&self) -> TransportKind;

    /// Transport name for logging.
    fn name(&self) -> &str;
}
