//! Session - the request/response correlation engine
//!
//! A [`Session`] owns one [`Transport`] plus the framing codec matched to its
//! kind, and turns the raw byte pipe into a request/response surface:
//!
//! - Outbound commands are encoded and written through the transport.
//! - Every decoded inbound frame is classified: a *status/ack* goes to the
//!   status broadcast and never satisfies a waiter; a *response* may complete
//!   the pending waiter for its code; a *push* only reaches the general
//!   frame broadcast.
//! - Correlation uses **waiters**: single-use completion slots registered
//!   per response code. A waiter must be registered *before* the command is
//!   sent, so a fast reply cannot arrive while no one is listening. At most
//!   one waiter may be pending per code; a second registration is a logic
//!   bug and fails immediately.
//!
//! Timeouts are always locally recoverable: an expired wait removes the
//! waiter from the registry and yields `Ok(None)`, leaving the session
//! usable for the next command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use meshlink_proto::codes::{
    RESP_CODE_BATT_AND_STORAGE, RESP_CODE_CHANNEL_INFO, RESP_CODE_CONTACT,
    RESP_CODE_CONTACTS_START, RESP_CODE_CURR_TIME, RESP_CODE_DEVICE_INFO,
    RESP_CODE_END_OF_CONTACTS, RESP_CODE_OK, RESP_CODE_SELF_INFO, SELF_INFO_MIN_LEN,
};
use meshlink_proto::wire::{decode_current_time, ContactListEnd};
use meshlink_proto::{
    is_push_code, BatteryAndStorage, BleFraming, ChannelInfo, Command, Contact,
    DeviceFirmwareInfo, Frame, FrameKind, Framing, SelfInfo, SerialFraming,
};

use crate::error::{Result, SessionError};
use crate::transport::{LinkState, Transport, TransportKind};

/// Session state, derived from transport connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable link.
    Disconnected,
    /// Link established; commands can be sent.
    Active,
    /// The inbound stream failed; the session must be rebuilt.
    Errored,
}

/// Direction of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    /// Host → device.
    Outbound,
    /// Device → host.
    Inbound,
}

/// A frame mirrored to the debug capture sink.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Which way the frame travelled.
    pub direction: FrameDirection,
    /// The frame itself.
    pub frame: Frame,
}

/// Result of a bulk contact collection.
#[derive(Debug, Clone, Default)]
pub struct ContactList {
    /// Contacts received before the end marker or timeout.
    pub contacts: Vec<Contact>,
    /// Whether the end-of-list marker arrived. `false` means the timeout
    /// expired and `contacts` holds partial results.
    pub complete: bool,
    /// Most recent modification timestamp, from the end marker.
    pub most_recent_lastmod: Option<u32>,
}

/// A pending request/response correlation entry.
struct Waiter {
    id: u64,
    validate: Option<Box<dyn Fn(&[u8]) -> bool + Send>>,
    tx: oneshot::Sender<Frame>,
}

/// State shared between the session handle and its read task.
struct Shared {
    waiters: Mutex<HashMap<u8, Waiter>>,
    next_waiter_id: AtomicU64,
    frames_tx: broadcast::Sender<Frame>,
    status_tx: broadcast::Sender<Frame>,
    capture: Mutex<Option<mpsc::UnboundedSender<CapturedFrame>>>,
    closed: AtomicBool,
    errored: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        let (frames_tx, _) = broadcast::channel(crate::transport::BROADCAST_CAPACITY);
        let (status_tx, _) = broadcast::channel(crate::transport::BROADCAST_CAPACITY);
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_waiter_id: AtomicU64::new(1),
            frames_tx,
            status_tx,
            capture: Mutex::new(None),
            closed: AtomicBool::new(false),
            errored: AtomicBool::new(false),
        }
    }

    fn capture(&self, direction: FrameDirection, frame: &Frame) {
        if let Some(tx) = &*self.capture.lock() {
            let _ = tx.send(CapturedFrame {
                direction,
                frame: frame.clone(),
            });
        }
    }

    /// Route one decoded frame. Status frames never touch the registry;
    /// responses may complete the pending waiter for their code; pushes only
    /// reach the general broadcast. Every frame is published on the general
    /// broadcast regardless of whether it satisfied a waiter.
    fn dispatch(&self, frame: Frame) {
        self.capture(FrameDirection::Inbound, &frame);

        match frame.kind() {
            FrameKind::Status => {
                trace!(code = frame.code, "status frame");
                let _ = self.status_tx.send(frame.clone());
            }
            FrameKind::Response => {
                let completed = self.try_complete_waiter(&frame);
                trace!(code = frame.code, completed, "response frame");
            }
            FrameKind::Push => {
                trace!(code = frame.code, "push frame");
            }
        }

        let _ = self.frames_tx.send(frame);
    }

    /// Complete the pending waiter for this frame's code, if one exists and
    /// its predicate (when present) accepts the payload.
    fn try_complete_waiter(&self, frame: &Frame) -> bool {
        let waiter = {
            let mut waiters = self.waiters.lock();
            let Some(pending) = waiters.get(&frame.code) else {
                return false;
            };
            if let Some(validate) = &pending.validate {
                if !validate(&frame.payload) {
                    debug!(
                        code = frame.code,
                        len = frame.payload.len(),
                        "response rejected by waiter predicate"
                    );
                    return false;
                }
            }
            let Some(waiter) = waiters.remove(&frame.code) else {
                return false;
            };
            waiter
        };

        if waiter.tx.send(frame.clone()).is_err() {
            debug!(code = frame.code, "waiter receiver dropped before completion");
        }
        true
    }

    fn remove_waiter_if(&self, code: u8, id: u64) {
        let mut waiters = self.waiters.lock();
        if waiters.get(&code).map(|w| w.id) == Some(id) {
            waiters.remove(&code);
            trace!(code, "waiter removed");
        }
    }
}

/// A registered, single-use correlation slot awaiting one response code.
///
/// Dropping the waiter (or letting [`ResponseWaiter::wait`] time out)
/// removes it from the registry, so an abandoned wait never leaks.
pub struct ResponseWaiter {
    code: u8,
    id: u64,
    rx: oneshot::Receiver<Frame>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ResponseWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWaiter")
            .field("code", &self.code)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ResponseWaiter {
    /// The response code this waiter is registered for.
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Wait for the matching response.
    ///
    /// Returns `Ok(None)` on timeout (the waiter is removed from the
    /// registry) and `Err(SessionError::Closed)` if the session was
    /// disposed while the wait was outstanding.
    pub async fn wait(mut self, timeout: Duration) -> Result<Option<Frame>> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                debug!(code = self.code, ?timeout, "response wait timed out");
                Ok(None)
            }
        }
    }

    /// Cancel the wait and release the slot.
    pub fn cancel(self) {}
}

impl Drop for ResponseWaiter {
    fn drop(&mut self) {
        self.shared.remove_waiter_if(self.code, self.id);
    }
}

/// A framed, bidirectional session over one transport.
pub struct Session {
    transport: Arc<dyn Transport>,
    encoder: Box<dyn Framing>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

fn codec_for(kind: TransportKind) -> Box<dyn Framing> {
    match kind {
        TransportKind::Ble => Box::new(BleFraming::new()),
        TransportKind::Serial => Box::new(SerialFraming::new()),
    }
}

impl Session {
    /// Create a session over a connected transport.
    ///
    /// The inbound subscription is taken before this returns, so frames
    /// arriving immediately afterwards are never lost.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let kind = transport.kind();
        let shared = Arc::new(Shared::new());
        let bytes_rx = transport.subscribe_bytes();
        let reader = tokio::spawn(read_loop(bytes_rx, codec_for(kind), Arc::clone(&shared)));

        debug!(transport = transport.name(), %kind, "session created");
        Session {
            transport,
            encoder: codec_for(kind),
            shared,
            reader,
        }
    }

    /// Session state, derived from transport connectivity. Not
    /// independently settable.
    pub fn state(&self) -> SessionState {
        if self.shared.closed.load(Ordering::SeqCst) {
            return SessionState::Disconnected;
        }
        if self.shared.errored.load(Ordering::SeqCst) {
            return SessionState::Errored;
        }
        match self.transport.state() {
            LinkState::Connected => SessionState::Active,
            _ => SessionState::Disconnected,
        }
    }

    /// Subscribe to every decoded frame (responses, status, pushes alike).
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.shared.frames_tx.subscribe()
    }

    /// Subscribe to status/ack frames only.
    pub fn subscribe_status(&self) -> broadcast::Receiver<Frame> {
        self.shared.status_tx.subscribe()
    }

    /// Mirror every frame crossing this session to a debug capture sink.
    pub fn set_capture(&self, sink: mpsc::UnboundedSender<CapturedFrame>) {
        *self.shared.capture.lock() = Some(sink);
    }

    // ========================================================================
    // Waiter registration
    // ========================================================================

    /// Register a waiter for `code`. Must be called before sending the
    /// corresponding command.
    pub fn register_waiter(&self, code: u8) -> Result<ResponseWaiter> {
        self.register(code, None)
    }

    /// Register a waiter whose completion additionally requires `validate`
    /// to accept the payload (e.g. a minimum length, to reject truncated
    /// frames posing as the real response).
    pub fn register_validated_waiter(
        &self,
        code: u8,
        validate: impl Fn(&[u8]) -> bool + Send + 'static,
    ) -> Result<ResponseWaiter> {
        self.register(code, Some(Box::new(validate)))
    }

    fn register(
        &self,
        code: u8,
        validate: Option<Box<dyn Fn(&[u8]) -> bool + Send>>,
    ) -> Result<ResponseWaiter> {
        if is_push_code(code) {
            return Err(SessionError::WaitOnPushCode { code });
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        let id = self.shared.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let mut waiters = self.shared.waiters.lock();
        if waiters.contains_key(&code) {
            return Err(SessionError::WaiterPending { code });
        }
        waiters.insert(code, Waiter { id, validate, tx });
        drop(waiters);

        trace!(code, "waiter registered");
        Ok(ResponseWaiter {
            code,
            id,
            rx,
            shared: Arc::clone(&self.shared),
        })
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Encode and send one frame through the transport.
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.state() != SessionState::Active {
            return Err(SessionError::NotConnected);
        }
        let bytes = self.encoder.encode(&frame)?;
        self.shared.capture(FrameDirection::Outbound, &frame);
        self.transport.send_bytes(&bytes).await?;
        trace!(code = frame.code, len = frame.payload.len(), "sent frame");
        Ok(())
    }

    /// Encode and send a command.
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        self.send_frame(command.to_frame()).await
    }

    // ========================================================================
    // High-level primitives
    // ========================================================================

    /// Run the two-step identification handshake.
    ///
    /// Sends the device query followed by app-start, then waits for a self
    /// info response carrying at least the fixed identity head. Returns
    /// `Ok(None)` if no acceptable response arrives within `timeout`.
    pub async fn identify(
        &self,
        app_name: &str,
        app_version: u8,
        timeout: Duration,
    ) -> Result<Option<SelfInfo>> {
        let waiter = self
            .register_validated_waiter(RESP_CODE_SELF_INFO, |payload| {
                payload.len() >= SELF_INFO_MIN_LEN
            })?;

        self.send_command(&Command::DeviceQuery { app_version }).await?;
        self.send_command(&Command::AppStart {
            app_version,
            app_name: app_name.to_string(),
        })
        .await?;

        match waiter.wait(timeout).await? {
            Some(frame) => Ok(Some(SelfInfo::decode(&frame.payload)?)),
            None => Ok(None),
        }
    }

    /// Keep-alive check. The protocol has no dedicated ping, so this
    /// requests the battery/storage metric and measures the round trip.
    pub async fn ping(&self, timeout: Duration) -> Result<Option<Duration>> {
        let waiter = self.register_waiter(RESP_CODE_BATT_AND_STORAGE)?;
        let started = Instant::now();
        self.send_command(&Command::GetBatteryAndStorage).await?;
        match waiter.wait(timeout).await? {
            Some(_) => Ok(Some(started.elapsed())),
            None => Ok(None),
        }
    }

    /// Request battery voltage and storage usage.
    pub async fn get_battery_and_storage(
        &self,
        timeout: Duration,
    ) -> Result<Option<BatteryAndStorage>> {
        let waiter = self.register_waiter(RESP_CODE_BATT_AND_STORAGE)?;
        self.send_command(&Command::GetBatteryAndStorage).await?;
        match waiter.wait(timeout).await? {
            Some(frame) => Ok(Some(BatteryAndStorage::decode(&frame.payload)?)),
            None => Ok(None),
        }
    }

    /// Request firmware build information.
    pub async fn get_device_info(
        &self,
        app_version: u8,
        timeout: Duration,
    ) -> Result<Option<DeviceFirmwareInfo>> {
        let waiter = self.register_waiter(RESP_CODE_DEVICE_INFO)?;
        self.send_command(&Command::DeviceQuery { app_version })
            .await?;
        match waiter.wait(timeout).await? {
            Some(frame) => Ok(Some(DeviceFirmwareInfo::decode(&frame.payload)?)),
            None => Ok(None),
        }
    }

    /// Collect the contact list.
    ///
    /// Sends the list request and gathers streamed contact entries until the
    /// end-of-list marker. If `timeout` expires first, the partial list is
    /// returned with `complete == false` rather than failing outright.
    pub async fn get_contacts(&self, since: Option<u32>, timeout: Duration) -> Result<ContactList> {
        // Subscribe before sending: entries streamed immediately after the
        // request must not be missed.
        let mut frames = self.subscribe_frames();
        self.send_command(&Command::GetContacts { since }).await?;

        let mut list = ContactList::default();
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(collected = list.contacts.len(), "contact collection timed out");
                return Ok(list);
            }

            let frame = match tokio::time::timeout(remaining, frames.recv()).await {
                Err(_) => {
                    debug!(collected = list.contacts.len(), "contact collection timed out");
                    return Ok(list);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!(missed, "frame stream lagged during contact collection");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(SessionError::Closed);
                }
                Ok(Ok(frame)) => frame,
            };

            match frame.code {
                RESP_CODE_CONTACTS_START => {}
                RESP_CODE_CONTACT => match Contact::decode(&frame.payload) {
                    Ok(contact) => list.contacts.push(contact),
                    Err(err) => warn!(%err, "skipping malformed contact entry"),
                },
                RESP_CODE_END_OF_CONTACTS => {
                    list.complete = true;
                    list.most_recent_lastmod = ContactListEnd::decode(&frame.payload)
                        .ok()
                        .map(|end| end.most_recent_lastmod);
                    return Ok(list);
                }
                _ => {}
            }
        }
    }

    /// Request one channel's configuration.
    pub async fn get_channel(&self, index: u8, timeout: Duration) -> Result<Option<ChannelInfo>> {
        let waiter = self.register_waiter(RESP_CODE_CHANNEL_INFO)?;
        self.send_command(&Command::GetChannel { index }).await?;
        match waiter.wait(timeout).await? {
            Some(frame) => Ok(Some(ChannelInfo::decode(&frame.payload)?)),
            None => Ok(None),
        }
    }

    /// Store one channel's configuration. Completion is the firmware's OK
    /// response.
    pub async fn set_channel(&self, channel: &ChannelInfo, timeout: Duration) -> Result<Option<()>> {
        let waiter = self.register_waiter(RESP_CODE_OK)?;
        self.send_command(&Command::SetChannel {
            channel: channel.clone(),
        })
        .await?;
        Ok(waiter.wait(timeout).await?.map(|_| ()))
    }

    /// Read the device clock.
    pub async fn get_device_time(&self, timeout: Duration) -> Result<Option<u32>> {
        let waiter = self.register_waiter(RESP_CODE_CURR_TIME)?;
        self.send_command(&Command::GetDeviceTime).await?;
        match waiter.wait(timeout).await? {
            Some(frame) => Ok(Some(decode_current_time(&frame.payload)?)),
            None => Ok(None),
        }
    }

    /// Set the device clock.
    pub async fn set_device_time(&self, time_secs: u32, timeout: Duration) -> Result<Option<()>> {
        let waiter = self.register_waiter(RESP_CODE_OK)?;
        self.send_command(&Command::SetDeviceTime { time_secs })
            .await?;
        Ok(waiter.wait(timeout).await?.map(|_| ()))
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Dispose the session: every outstanding waiter is completed with an
    /// error, the inbound subscription is cancelled, and the published
    /// streams close when the session is dropped. Never leaves a caller
    /// suspended forever.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reader.abort();

        let drained = {
            let mut waiters = self.shared.waiters.lock();
            let count = waiters.len();
            waiters.clear();
            count
        };
        if drained > 0 {
            debug!(waiters = drained, "failed outstanding waiters on session close");
        }
        debug!(transport = self.transport.name(), "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads raw transport bytes, reassembles frames, and dispatches them.
async fn read_loop(
    mut bytes_rx: broadcast::Receiver<Bytes>,
    mut decoder: Box<dyn Framing>,
    shared: Arc<Shared>,
) {
    loop {
        match bytes_rx.recv().await {
            Ok(chunk) => {
                decoder.feed(&chunk);
                while let Some(frame) = decoder.try_decode() {
                    shared.dispatch(frame);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "inbound byte stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    shared.errored.store(true, Ordering::SeqCst);
                }
                break;
            }
        }
    }
}
