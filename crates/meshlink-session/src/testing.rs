//! In-memory transport for testing without hardware
//!
//! [`MockTransport`] implements the [`Transport`] contract entirely in
//! memory: tests script the inbound byte stream, record what the session
//! writes, and inject failures. The bridge crate's integration tests reuse
//! it to drive whole connection attempts against a simulated device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use meshlink_proto::codec::{SERIAL_HEADER_LEN, SERIAL_MARKER_INBOUND};
use meshlink_proto::Frame;

use crate::error::TransportError;
use crate::transport::{LinkState, Transport, TransportKind, BROADCAST_CAPACITY};

/// Script invoked for every outbound write; returned chunks are injected
/// back as inbound bytes, simulating a device that answers commands.
pub type WriteScript = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// Simulated transport for unit and integration tests.
pub struct MockTransport {
    kind: TransportKind,
    name: String,
    state: Mutex<LinkState>,
    state_tx: broadcast::Sender<LinkState>,
    bytes_tx: broadcast::Sender<Bytes>,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_connect: AtomicBool,
    fail_writes: AtomicBool,
    on_write: Mutex<Option<WriteScript>>,
}

impl MockTransport {
    /// Create a mock transport of the given kind.
    pub fn new(kind: TransportKind) -> Arc<Self> {
        let (state_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (bytes_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            kind,
            name: format!("mock:{kind}"),
            state: Mutex::new(LinkState::Disconnected),
            state_tx,
            bytes_tx,
            sent: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            on_write: Mutex::new(None),
        })
    }

    /// Create a connected mock transport.
    pub fn connected(kind: TransportKind) -> Arc<Self> {
        let transport = Self::new(kind);
        transport.set_state(LinkState::Connected);
        transport
    }

    /// Force the link state and broadcast the transition.
    pub fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
        let _ = self.state_tx.send(state);
    }

    /// Make the next `connect` call fail.
    pub fn fail_connect(&self, enabled: bool) {
        self.fail_connect.store(enabled, Ordering::SeqCst);
    }

    /// Make writes fail.
    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// Install a script that answers outbound writes with inbound chunks.
    pub fn set_write_script(&self, script: WriteScript) {
        *self.on_write.lock() = Some(script);
    }

    /// Inject raw inbound bytes.
    pub fn inject_bytes(&self, chunk: &[u8]) {
        let _ = self.bytes_tx.send(Bytes::copy_from_slice(chunk));
    }

    /// Inject one inbound frame, framed the way a device on this transport
    /// kind would send it.
    pub fn inject_frame(&self, frame: &Frame) {
        self.inject_bytes(&Self::device_bytes(self.kind, frame));
    }

    /// Frame bytes as a device on `kind` would emit them.
    pub fn device_bytes(kind: TransportKind, frame: &Frame) -> Vec<u8> {
        let inner = frame.to_inner();
        match kind {
            TransportKind::Ble => inner,
            TransportKind::Serial => {
                let mut out = Vec::with_capacity(SERIAL_HEADER_LEN + inner.len());
                out.push(SERIAL_MARKER_INBOUND);
                out.extend_from_slice(&(inner.len() as u16).to_le_bytes());
                out.extend_from_slice(&inner);
                out
            }
        }
    }

    /// Everything written through this transport, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Number of writes recorded.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                target: self.name.clone(),
                reason: "simulated connect failure".to_string(),
            });
        }
        self.set_state(LinkState::Connecting);
        self.set_state(LinkState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.set_state(LinkState::Disconnected);
        Ok(())
    }

    async fn dispose(&self) {
        self.set_state(LinkState::Disconnected);
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
        if *self.state.lock() != LinkState::Connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteError(
                "simulated write failure".to_string(),
            ));
        }
        self.sent.lock().push(data.to_vec());

        let replies = self
            .on_write
            .lock()
            .as_ref()
            .map(|script| script(data))
            .unwrap_or_default();
        for chunk in replies {
            self.inject_bytes(&chunk);
        }
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }
}
