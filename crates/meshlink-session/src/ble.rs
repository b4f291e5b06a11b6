//! Bluetooth Low Energy transport
//!
//! Byte pipe over a btleplug peripheral. Companion radios expose a
//! Nordic-UART-style GATT service: the host writes frames to the RX
//! characteristic and receives frames as notifications on the TX
//! characteristic. A device that does not expose both characteristics under
//! the service is non-conformant and rejected as unsupported.
//!
//! On Linux this requires BlueZ development files:
//! ```bash
//! apt install libdbus-1-dev
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{
    LinkState, Transport, TransportKind, BROADCAST_CAPACITY, MESHCORE_SERVICE_UUID,
};

/// RX characteristic (host → device writes).
pub const MESHCORE_RX_CHAR_UUID: Uuid =
    Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// TX characteristic (device → host notifications).
pub const MESHCORE_TX_CHAR_UUID: Uuid =
    Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// BLE transport over a discovered peripheral.
pub struct BleTransport {
    peripheral: Peripheral,
    name: String,
    state: Arc<Mutex<LinkState>>,
    state_tx: broadcast::Sender<LinkState>,
    bytes_tx: broadcast::Sender<Bytes>,
    rx_char: Mutex<Option<Characteristic>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Wrap a peripheral produced by the platform scan layer.
    pub fn new(peripheral: Peripheral, name: impl Into<String>) -> Self {
        let (state_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (bytes_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            peripheral,
            name: name.into(),
            state: Arc::new(Mutex::new(LinkState::Disconnected)),
            state_tx,
            bytes_tx,
            rx_char: Mutex::new(None),
            notify_task: Mutex::new(None),
        }
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
        let _ = self.state_tx.send(state);
    }

    /// Locate a characteristic under the companion service.
    fn find_char(&self, uuid: Uuid) -> Option<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid && c.service_uuid == MESHCORE_SERVICE_UUID)
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.state() == LinkState::Connected {
            return Ok(());
        }

        self.set_state(LinkState::Connecting);
        info!(device = %self.name, "connecting BLE transport");

        self.peripheral.connect().await.map_err(|e| {
            self.set_state(LinkState::Disconnected);
            TransportError::ConnectFailed {
                target: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        self.peripheral.discover_services().await.map_err(|e| {
            self.set_state(LinkState::Disconnected);
            TransportError::ConnectFailed {
                target: self.name.clone(),
                reason: format!("service discovery failed: {e}"),
            }
        })?;

        // Both characteristics must exist under the companion service; a
        // generic device-information service is not required.
        let rx_char = self.find_char(MESHCORE_RX_CHAR_UUID).ok_or_else(|| {
            TransportError::UnsupportedDevice("missing RX (write) characteristic".to_string())
        })?;
        let tx_char = self.find_char(MESHCORE_TX_CHAR_UUID).ok_or_else(|| {
            TransportError::UnsupportedDevice("missing TX (notify) characteristic".to_string())
        })?;

        self.peripheral.subscribe(&tx_char).await.map_err(|e| {
            TransportError::ConnectFailed {
                target: self.name.clone(),
                reason: format!("notify subscription failed: {e}"),
            }
        })?;

        let mut notifications = self.peripheral.notifications().await.map_err(|e| {
            TransportError::ConnectFailed {
                target: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let bytes_tx = self.bytes_tx.clone();
        let state = Arc::clone(&self.state);
        let state_tx = self.state_tx.clone();
        let name = self.name.clone();
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != MESHCORE_TX_CHAR_UUID {
                    continue;
                }
                trace!(bytes = notification.value.len(), "BLE notification");
                let _ = bytes_tx.send(Bytes::from(notification.value));
            }
            warn!(device = %name, "BLE notification stream ended");
            *state.lock() = LinkState::Disconnected;
            let _ = state_tx.send(LinkState::Disconnected);
        });
        *self.notify_task.lock() = Some(task);

        *self.rx_char.lock() = Some(rx_char);
        self.set_state(LinkState::Connected);
        info!(device = %self.name, "BLE transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(task) = self.notify_task.lock().take() {
            task.abort();
        }
        *self.rx_char.lock() = None;

        if let Err(e) = self.peripheral.disconnect().await {
            debug!(device = %self.name, error = %e, "BLE disconnect error");
        }
        self.set_state(LinkState::Disconnected);
        info!(device = %self.name, "BLE transport disconnected");
        Ok(())
    }

    async fn dispose(&self) {
        let _ = self.disconnect().await;
        debug!(device = %self.name, "BLE transport disposed");
    }

    fn state(&self) -> LinkState {
        *self.state.lock()
    }

    fn subscribe_state(&self) -> broadcast::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    fn subscribe_bytes(&self) -> broadcast::Receiver<Bytes> {
        self.bytes_tx.subscribe()
    }

    async fn send_bytes(&self, data: &[u8]) -> Result<(), TransportError> {
        let rx_char = self
            .rx_char
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        self.peripheral
            .write(&rx_char, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| {
                error!(device = %self.name, error = %e, "BLE write error");
                TransportError::WriteError(e.to_string())
            })?;

        trace!(bytes = data.len(), "wrote to BLE transport");
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
