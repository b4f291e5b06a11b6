//! Connection coordinator
//!
//! The top-level orchestrator for one device connection: runs detection,
//! locks the winning protocol for the duration of the attempt, constructs
//! the matching transport and adapter through injected factories, drives
//! identification, and publishes every [`ConnectionState`] transition.
//!
//! Two invariants shape everything here:
//!
//! - **Single flight**: only one `connect` runs at a time system-wide. A
//!   second caller gets an immediate `already connecting` result, never a
//!   queue slot.
//! - **Protocol lock**: detection runs exactly once per attempt and the
//!   result is fixed regardless of later errors, so a failure mid-attempt
//!   can never retry under the other protocol and cross-wire resources.
//!   Failure cleanup only touches resources the locked branch created.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use meshlink_session::{Session, Transport, TransportError, TransportKind, MESHCORE_SERVICE_UUID};

use crate::adapter::{DeviceAdapter, MeshCoreAdapter};
use crate::config::BridgeConfig;
use crate::detect::ProtocolDetector;
use crate::error::{CommandError, ErrorKind};
use crate::legacy::{MeshtasticAdapter, MeshtasticEngine};
use crate::types::{
    ConnectionResult, ConnectionState, DiscoveredDevice, MeshDeviceInfo, Protocol,
};

/// Builds transports for MeshCore connection attempts.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Construct an unconnected transport for the device.
    async fn create(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Builds the MeshCore adapter for a connected session.
pub trait MeshCoreAdapterFactory: Send + Sync {
    /// Construct the adapter driving `session`.
    fn create(
        &self,
        session: Session,
        transport: Arc<dyn Transport>,
        config: &BridgeConfig,
    ) -> Arc<dyn DeviceAdapter>;
}

/// Builds the legacy shim adapter over the engine handle.
pub trait LegacyAdapterFactory: Send + Sync {
    /// Construct the shim adapter.
    fn create(
        &self,
        engine: Arc<dyn MeshtasticEngine>,
        config: &BridgeConfig,
    ) -> Arc<dyn DeviceAdapter>;
}

/// Default MeshCore adapter construction.
#[derive(Debug, Default)]
pub struct DefaultMeshCoreAdapterFactory;

impl MeshCoreAdapterFactory for DefaultMeshCoreAdapterFactory {
    fn create(
        &self,
        session: Session,
        transport: Arc<dyn Transport>,
        config: &BridgeConfig,
    ) -> Arc<dyn DeviceAdapter> {
        Arc::new(MeshCoreAdapter::new(session, transport, config.clone()))
    }
}

/// Default legacy adapter construction.
#[derive(Debug, Default)]
pub struct DefaultLegacyAdapterFactory;

impl LegacyAdapterFactory for DefaultLegacyAdapterFactory {
    fn create(
        &self,
        engine: Arc<dyn MeshtasticEngine>,
        config: &BridgeConfig,
    ) -> Arc<dyn DeviceAdapter> {
        Arc::new(MeshtasticAdapter::new(engine, config))
    }
}

/// The connection owned by the coordinator between connect and disconnect.
struct ActiveConnection {
    protocol: Protocol,
    adapter: Arc<dyn DeviceAdapter>,
    device: MeshDeviceInfo,
}

/// Orchestrates one connection at a time and publishes its lifecycle.
pub struct ConnectionCoordinator {
    config: BridgeConfig,
    detector: ProtocolDetector,
    transports: Arc<dyn TransportFactory>,
    meshcore_adapters: Arc<dyn MeshCoreAdapterFactory>,
    legacy_adapters: Arc<dyn LegacyAdapterFactory>,
    engine: Option<Arc<dyn MeshtasticEngine>>,
    state: Mutex<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    active: Mutex<Option<ActiveConnection>>,
    connecting: AtomicBool,
}

impl ConnectionCoordinator {
    /// Create a coordinator with default adapter factories.
    pub fn new(config: BridgeConfig, transports: Arc<dyn TransportFactory>) -> Self {
        let (state_tx, _) = broadcast::channel(64);
        Self {
            config,
            detector: ProtocolDetector::new(),
            transports,
            meshcore_adapters: Arc::new(DefaultMeshCoreAdapterFactory),
            legacy_adapters: Arc::new(DefaultLegacyAdapterFactory),
            engine: None,
            state: Mutex::new(ConnectionState::Disconnected),
            state_tx,
            active: Mutex::new(None),
            connecting: AtomicBool::new(false),
        }
    }

    /// Supply the externally-owned legacy engine handle. Without it, legacy
    /// and unknown devices cannot be connected.
    pub fn with_engine(mut self, engine: Arc<dyn MeshtasticEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Substitute the MeshCore adapter factory (used by tests to prove
    /// protocol isolation).
    pub fn with_meshcore_adapter_factory(
        mut self,
        factory: Arc<dyn MeshCoreAdapterFactory>,
    ) -> Self {
        self.meshcore_adapters = factory;
        self
    }

    /// Substitute the legacy adapter factory.
    pub fn with_legacy_adapter_factory(mut self, factory: Arc<dyn LegacyAdapterFactory>) -> Self {
        self.legacy_adapters = factory;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Subscribe to connection-state transitions. Every transition is
    /// broadcast before the operation that caused it returns.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The active adapter, once connected.
    pub fn adapter(&self) -> Option<Arc<dyn DeviceAdapter>> {
        self.active.lock().as_ref().map(|a| Arc::clone(&a.adapter))
    }

    /// The identified device, once connected.
    pub fn device(&self) -> Option<MeshDeviceInfo> {
        self.active.lock().as_ref().map(|a| a.device.clone())
    }

    fn publish(&self, state: ConnectionState) {
        *self.state.lock() = state;
        debug!(%state, "connection state");
        let _ = self.state_tx.send(state);
    }

    /// Run one connection attempt against a discovered device.
    ///
    /// Returns synchronously with the single-flight rejection if an attempt
    /// is already in flight.
    pub async fn connect(&self, device: &DiscoveredDevice) -> ConnectionResult {
        if self.connecting.swap(true, Ordering::SeqCst) {
            debug!(device = %device.id, "rejecting overlapping connection attempt");
            return ConnectionResult::already_connecting();
        }

        let result = self.run_attempt(device).await;
        self.connecting.store(false, Ordering::SeqCst);
        result
    }

    async fn run_attempt(&self, device: &DiscoveredDevice) -> ConnectionResult {
        self.publish(ConnectionState::Connecting);

        // Detection runs exactly once; the result is locked for the whole
        // attempt, errors included.
        let detection = self.detector.detect(device);
        info!(
            device = %device.id,
            protocol = %detection.protocol,
            confidence = detection.confidence,
            reason = %detection.reason,
            "protocol locked for attempt"
        );

        let result = match detection.protocol {
            Protocol::MeshCore => self.connect_meshcore(device).await,
            Protocol::Meshtastic | Protocol::Unknown => self.connect_legacy(device).await,
        };

        match &result {
            r if r.success => self.publish(ConnectionState::Connected),
            _ => self.publish(ConnectionState::Error),
        }
        result
    }

    async fn connect_meshcore(&self, device: &DiscoveredDevice) -> ConnectionResult {
        // Defense in depth against misclassification: the companion service
        // must actually be advertised before any transport is allocated.
        if device.transport == TransportKind::Ble
            && !device.advertises_service(MESHCORE_SERVICE_UUID)
        {
            warn!(device = %device.id, "companion service not advertised");
            return ConnectionResult::failed(
                ErrorKind::UnsupportedDevice,
                "companion service not advertised by device",
            );
        }

        let transport = match self.transports.create(device).await {
            Ok(transport) => transport,
            Err(err) => {
                let err = CommandError::from(err);
                return ConnectionResult::failed(err.kind, err.message);
            }
        };

        if let Err(err) = transport.connect().await {
            transport.dispose().await;
            let err = CommandError::from(err);
            return ConnectionResult::failed(err.kind, err.message);
        }

        let session = Session::new(Arc::clone(&transport));
        let adapter =
            self.meshcore_adapters
                .create(session, Arc::clone(&transport), &self.config);

        self.publish(ConnectionState::Identifying);
        match adapter.identify().await {
            Ok(info) => {
                *self.active.lock() = Some(ActiveConnection {
                    protocol: Protocol::MeshCore,
                    adapter: Arc::clone(&adapter),
                    device: info.clone(),
                });
                ConnectionResult::connected(info, adapter)
            }
            Err(err) => {
                // Tear down only what this attempt created.
                warn!(%err, "MeshCore identification failed");
                adapter.dispose().await;
                ConnectionResult::failed(err.kind, err.message)
            }
        }
    }

    async fn connect_legacy(&self, device: &DiscoveredDevice) -> ConnectionResult {
        let Some(engine) = self.engine.as_ref() else {
            warn!(device = %device.id, "no legacy engine available");
            return ConnectionResult::failed(
                ErrorKind::NetworkUnavailable,
                "no legacy engine available for this device",
            );
        };

        let adapter = self.legacy_adapters.create(Arc::clone(engine), &self.config);

        self.publish(ConnectionState::Identifying);
        match adapter.identify().await {
            Ok(info) => {
                *self.active.lock() = Some(ActiveConnection {
                    protocol: Protocol::Meshtastic,
                    adapter: Arc::clone(&adapter),
                    device: info.clone(),
                });
                ConnectionResult::connected(info, adapter)
            }
            Err(err) => {
                // The engine's transport lifecycle is not owned here; only
                // the adapter reference is dropped.
                warn!(%err, "legacy identification failed");
                ConnectionResult::failed(err.kind, err.message)
            }
        }
    }

    /// Tear down the active connection, releasing only the resources that
    /// belong to the locked protocol.
    pub async fn disconnect(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };

        self.publish(ConnectionState::Disconnecting);
        info!(protocol = %active.protocol, "disconnecting");

        active.adapter.disconnect().await;
        if active.protocol == Protocol::MeshCore {
            active.adapter.dispose().await;
        }

        self.publish(ConnectionState::Disconnected);
    }
}
