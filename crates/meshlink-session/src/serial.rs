//! Serial port transport
//!
//! Async serial communication using tokio-serial. The transport is a plain
//! byte pipe: raw read chunks are forwarded to the byte broadcast and
//! framing is left to the session's serial codec.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace};

use crate::error::TransportError;
use crate::transport::{LinkState, Transport, TransportKind, BROADCAST_CAPACITY};

/// Default baud rate for companion radios.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default connection timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 10000;

/// Buffer size for reading from the serial port. Kept below the framing
/// codec's overflow cap so one read can never trip it.
const READ_BUFFER_SIZE: usize = 256;

/// USB vendor ids of chips commonly found on companion radios (Silicon
/// Labs CP210x, FTDI, Espressif native USB, CH340).
const KNOWN_USB_VENDORS: &[u16] = &[0x10C4, 0x0403, 0x303A, 0x1A86];

/// List serial ports that look like companion radios.
///
/// Scans available ports and keeps USB devices from known radio vendors.
/// Ports that cannot be classified are omitted rather than guessed at.
pub fn list_ports() -> Vec<String> {
    let Ok(ports) = serialport::available_ports() else {
        return Vec::new();
    };
    ports
        .into_iter()
        .filter(|port| match &port.port_type {
            serialport::SerialPortType::UsbPort(usb) => KNOWN_USB_VENDORS.contains(&usb.vid),
            _ => false,
        })
        .map(|port| port.port_name)
        .collect()
}

/// Serial/USB transport.
pub struct SerialTransport {
    port_path: PathBuf,
    baud_rate: u32,
    timeout: Duration,
    name: String,
    state: Arc<Mutex<LinkState>>,
    state_tx: broadcast::Sender<LinkState>,
    bytes_tx: broadcast::Sender<Bytes>,
    writer: tokio::sync::Mutex<Option<WriteHalf<SerialStream>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    /// Create a new serial transport for the given port.
    pub fn new(port: impl AsRef<Path>) -> Self {
        let port_path = port.as_ref().to_path_buf();
        let name = format!("serial:{}", port_path.display());
        let (state_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (bytes_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            port_path,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            name,
            state: Arc::new(Mutex::new(LinkState::Disconnected)),
            state_tx,
            bytes_tx,
            writer: tokio::sync::Mutex::new(None),
            reader_task: Mutex::new(None),
        }
    }

    /// Create with custom baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Create with custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The port path.
    pub fn port_path(&self) -> &Path {
        &self.port_path
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
        let _ = self.state_tx.send(state);
    }
}

/// Reads raw chunks from the port and forwards them to the byte broadcast.
async fn serial_read_loop(
    mut reader: ReadHalf<SerialStream>,
    bytes_tx: broadcast::Sender<Bytes>,
    state: Arc<Mutex<LinkState>>,
    state_tx: broadcast::Sender<LinkState>,
    name: String,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                // EOF - device unplugged or port closed
                info!(transport = %name, "serial port closed");
                break;
            }
            Ok(n) => {
                trace!(bytes = n, "read from serial port");
                let _ = bytes_tx.send(Bytes::copy_from_slice(&buf[..n]));
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                error!(transport = %name, error = %e, "serial read error");
                break;
            }
        }
    }
    *state.lock() = LinkState::Disconnected;
    let _ = state_tx.send(LinkState::Disconnected);
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.state() == LinkState::Connected {
            return Ok(());
        }

        self.set_state(LinkState::Connecting);
        info!(port = %self.port_path.display(), baud = self.baud_rate, "connecting to serial port");

        if !self.port_path.exists() {
            self.set_state(LinkState::Disconnected);
            return Err(TransportError::ConnectFailed {
                target: self.port_path.display().to_string(),
                reason: "port not found".to_string(),
            });
        }

        let stream = tokio_serial::new(self.port_path.to_string_lossy(), self.baud_rate)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|e| {
                self.set_state(LinkState::Disconnected);
                TransportError::ConnectFailed {
                    target: self.port_path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

        let (reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);

        let task = tokio::spawn(serial_read_loop(
            reader,
            self.bytes_tx.clone(),
            Arc::clone(&self.state),
            self.state_tx.clone(),
            self.name.clone(),
        ));
        *self.reader_task.lock() = Some(task);

        self.set_state(LinkState::Connected);
        info!(port = %self.port_path.display(), "serial transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        if let Some(writer) = self.writer.lock().await.take() {
            drop(writer);
        }
        self.set_state(LinkState::Disconnected);
        info!(port = %self.port_path.display(), "serial transport disconnected");
        Ok(())
    }

    async fn dispose(&self) {
        let _ = self.disconnect().await;
        debug!(port = %self.port_path.display(), "serial transport disposed");
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
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(TransportError::NotConnected)?;

        stream.write_all(data).await.map_err(|e| {
            error!(error = %e, "serial write error");
            TransportError::WriteError(e.to_string())
        })?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::WriteError(format!("flush failed: {e}")))?;

        trace!(bytes = data.len(), "wrote to serial port");
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port_path)
            .field("baud_rate", &self.baud_rate)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_name() {
        let transport = SerialTransport::new("/dev/ttyUSB0");
        assert_eq!(transport.name(), "serial:/dev/ttyUSB0");
        assert_eq!(transport.kind(), TransportKind::Serial);
    }

    #[test]
    fn test_initial_state() {
        let transport = SerialTransport::new("/dev/ttyUSB0");
        assert_eq!(transport.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_missing_port_fails() {
        let transport = SerialTransport::new("/dev/does-not-exist-mlk");
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        assert_eq!(transport.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let transport = SerialTransport::new("/dev/ttyUSB0");
        let err = transport.send_bytes(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }
}
