//! End-to-end coordinator tests against scripted in-memory transports.
//!
//! These exercise the whole connection flow: detection, protocol locking,
//! transport/adapter construction through injected factories, the
//! identification handshake, scoped failure cleanup, and the single-flight
//! guard.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use meshlink_proto::codes::{CMD_APP_START, PUB_KEY_SIZE, RESP_CODE_SELF_INFO};
use meshlink_proto::Frame;
use meshlink_session::testing::MockTransport;
use meshlink_session::{LinkState, Session, Transport, TransportError, TransportKind};

use meshlink_bridge::{
    BridgeConfig, ConnectionCoordinator, ConnectionState, DefaultLegacyAdapterFactory,
    DeviceAdapter, DiscoveredDevice, ErrorKind, LegacyAdapterFactory, MeshCoreAdapterFactory,
    MeshtasticEngine, Protocol, ProtocolDetector, TransportFactory, MESHCORE_SERVICE_UUID,
    MESHTASTIC_SERVICE_UUID,
};

/// Factory that hands out scripted mock transports and records every one.
struct MockTransportFactory {
    reply_self_info: bool,
    fail_connect: bool,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    fn new(reply_self_info: bool) -> Arc<Self> {
        Arc::new(Self {
            reply_self_info,
            fail_connect: false,
            created: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply_self_info: false,
            fail_connect: true,
            created: Mutex::new(Vec::new()),
        })
    }

    fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().clone()
    }
}

fn self_info_payload(name: &str) -> Vec<u8> {
    let mut data = vec![1, 22, 30];
    data.extend_from_slice(&[0x42; PUB_KEY_SIZE]);
    data.extend_from_slice(name.as_bytes());
    data.push(0);
    data
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        _device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = MockTransport::new(TransportKind::Ble);
        if self.fail_connect {
            transport.fail_connect(true);
        }
        if self.reply_self_info {
            transport.set_write_script(Box::new(|written| {
                if written.first() == Some(&CMD_APP_START) {
                    vec![MockTransport::device_bytes(
                        TransportKind::Ble,
                        &Frame::new(RESP_CODE_SELF_INFO, self_info_payload("Summit Relay")),
                    )]
                } else {
                    Vec::new()
                }
            }));
        }
        self.created.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Legacy factory wrapper that counts invocations.
struct RecordingLegacyFactory {
    invoked: AtomicUsize,
    inner: DefaultLegacyAdapterFactory,
}

impl RecordingLegacyFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invoked: AtomicUsize::new(0),
            inner: DefaultLegacyAdapterFactory,
        })
    }
}

impl LegacyAdapterFactory for RecordingLegacyFactory {
    fn create(
        &self,
        engine: Arc<dyn MeshtasticEngine>,
        config: &BridgeConfig,
    ) -> Arc<dyn DeviceAdapter> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        self.inner.create(engine, config)
    }
}

/// MeshCore factory wrapper that counts invocations.
struct RecordingMeshCoreFactory {
    invoked: AtomicUsize,
    inner: meshlink_bridge::DefaultMeshCoreAdapterFactory,
}

impl RecordingMeshCoreFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invoked: AtomicUsize::new(0),
            inner: meshlink_bridge::DefaultMeshCoreAdapterFactory,
        })
    }
}

impl MeshCoreAdapterFactory for RecordingMeshCoreFactory {
    fn create(
        &self,
        session: Session,
        transport: Arc<dyn Transport>,
        config: &BridgeConfig,
    ) -> Arc<dyn DeviceAdapter> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        self.inner.create(session, transport, config)
    }
}

/// Engine stub for legacy-path tests.
struct StubEngine {
    node_id: Option<u32>,
}

impl MeshtasticEngine for StubEngine {
    fn is_running(&self) -> bool {
        true
    }
    fn node_id(&self) -> Option<u32> {
        self.node_id
    }
    fn node_name(&self) -> Option<String> {
        Some("Trail Beacon".to_string())
    }
    fn firmware_version(&self) -> Option<String> {
        Some("2.5.1".to_string())
    }
}

fn meshcore_device() -> DiscoveredDevice {
    DiscoveredDevice {
        id: "ble-1".to_string(),
        name: Some("MeshCore-a1f0".to_string()),
        transport: TransportKind::Ble,
        service_uuids: vec![MESHCORE_SERVICE_UUID],
        ..Default::default()
    }
}

fn meshtastic_device() -> DiscoveredDevice {
    DiscoveredDevice {
        id: "ble-2".to_string(),
        name: Some("Meshtastic_1a2b".to_string()),
        transport: TransportKind::Ble,
        service_uuids: vec![MESHTASTIC_SERVICE_UUID],
        ..Default::default()
    }
}

fn quick_config() -> BridgeConfig {
    BridgeConfig::builder()
        .identify_timeout(Duration::from_millis(300))
        .command_timeout(Duration::from_millis(150))
        .legacy_grace(Duration::from_millis(50))
        .build()
}

/// Drain every buffered state transition from a subscription.
fn drain_states(rx: &mut tokio::sync::broadcast::Receiver<ConnectionState>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(state) = rx.try_recv() {
        states.push(state);
    }
    states
}

#[tokio::test]
async fn test_detection_end_to_end_from_advertisement() {
    let detection = ProtocolDetector::new().detect(&meshcore_device());
    assert_eq!(detection.protocol, Protocol::MeshCore);
    assert_eq!(detection.confidence, 1.0);
}

#[tokio::test]
async fn test_successful_meshcore_connection_publishes_states() {
    let factory = MockTransportFactory::new(true);
    let coordinator = ConnectionCoordinator::new(quick_config(), factory.clone());
    let mut states = coordinator.subscribe();

    let result = coordinator.connect(&meshcore_device()).await;
    assert!(result.success, "{:?}", result);

    let device = result.device.unwrap();
    assert_eq!(device.protocol, Protocol::MeshCore);
    assert_eq!(device.name, "Summit Relay");

    assert_eq!(
        drain_states(&mut states),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Identifying,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(coordinator.state(), ConnectionState::Connected);
    assert!(coordinator.adapter().is_some());
}

#[tokio::test]
async fn test_identify_timeout_publishes_error_and_disposes_transport() {
    // The transport never answers with an acceptable self info.
    let factory = MockTransportFactory::new(false);
    let coordinator = ConnectionCoordinator::new(quick_config(), factory.clone());
    let mut states = coordinator.subscribe();

    let result = coordinator.connect(&meshcore_device()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));

    assert_eq!(coordinator.state(), ConnectionState::Error);
    assert!(drain_states(&mut states).contains(&ConnectionState::Error));
    assert!(coordinator.adapter().is_none());

    // The transport created for this attempt was torn down.
    let created = factory.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].state(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_transport_failure_never_falls_through_to_legacy_branch() {
    let factory = MockTransportFactory::failing();
    let legacy = RecordingLegacyFactory::new();
    let coordinator = ConnectionCoordinator::new(quick_config(), factory.clone())
        .with_engine(Arc::new(StubEngine { node_id: Some(1) }))
        .with_legacy_adapter_factory(legacy.clone());

    let result = coordinator.connect(&meshcore_device()).await;
    assert!(!result.success);

    // The protocol lock held: the legacy factory was never consulted.
    assert_eq!(legacy.invoked.load(Ordering::SeqCst), 0);
    assert_eq!(coordinator.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_legacy_device_never_touches_meshcore_resources() {
    let factory = MockTransportFactory::new(true);
    let meshcore = RecordingMeshCoreFactory::new();
    let coordinator = ConnectionCoordinator::new(quick_config(), factory.clone())
        .with_engine(Arc::new(StubEngine {
            node_id: Some(0xABCD),
        }))
        .with_meshcore_adapter_factory(meshcore.clone());

    let result = coordinator.connect(&meshtastic_device()).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.device.unwrap().protocol, Protocol::Meshtastic);

    // No transport was allocated and no MeshCore adapter constructed.
    assert!(factory.created().is_empty());
    assert_eq!(meshcore.invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_legacy_without_engine_is_network_unavailable() {
    let factory = MockTransportFactory::new(true);
    let coordinator = ConnectionCoordinator::new(quick_config(), factory);

    let result = coordinator.connect(&meshtastic_device()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::NetworkUnavailable));
}

#[tokio::test]
async fn test_misclassified_device_rejected_before_transport_allocation() {
    // Name says MeshCore but the advertisement lacks the companion service.
    let factory = MockTransportFactory::new(true);
    let coordinator = ConnectionCoordinator::new(quick_config(), factory.clone());

    let device = DiscoveredDevice {
        id: "ble-3".to_string(),
        name: Some("MeshCore-ffff".to_string()),
        transport: TransportKind::Ble,
        ..Default::default()
    };

    let result = coordinator.connect(&device).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::UnsupportedDevice));
    assert!(factory.created().is_empty());
}

#[tokio::test]
async fn test_overlapping_connects_single_flight() {
    let factory = MockTransportFactory::new(true);
    let coordinator =
        Arc::new(ConnectionCoordinator::new(quick_config(), factory.clone()));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.connect(&meshcore_device()).await })
    };

    // Give the first attempt time to take the guard; it then spends at
    // least the device-info timeout inside identification.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let second = coordinator.connect(&meshcore_device()).await;
    assert!(second.is_already_connecting());

    // Only the first attempt allocated a transport.
    assert_eq!(factory.created().len(), 1);

    let first = first.await.unwrap();
    assert!(first.success, "{:?}", first);
    assert_eq!(coordinator.state(), ConnectionState::Connected);

    // With the attempt finished, connecting again is allowed.
    coordinator.disconnect().await;
    assert_eq!(coordinator.state(), ConnectionState::Disconnected);
    let third = coordinator.connect(&meshcore_device()).await;
    assert!(third.success);
}

#[tokio::test]
async fn test_disconnect_releases_meshcore_resources() {
    let factory = MockTransportFactory::new(true);
    let coordinator = ConnectionCoordinator::new(quick_config(), factory.clone());

    let result = coordinator.connect(&meshcore_device()).await;
    assert!(result.success);

    coordinator.disconnect().await;
    assert_eq!(coordinator.state(), ConnectionState::Disconnected);
    assert!(coordinator.adapter().is_none());

    let created = factory.created();
    assert_eq!(created[0].state(), LinkState::Disconnected);
}
