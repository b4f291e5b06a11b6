//! Device adapter contract and the MeshCore implementation
//!
//! A [`DeviceAdapter`] is the uniform capability surface the application
//! shell drives, implemented once per protocol. The MeshCore adapter drives
//! a [`Session`] directly; the legacy adapter (see [`crate::legacy`]) is a
//! shim over an independently-running engine. The two never touch each
//! other's resources - enforced structurally by injected construction, not
//! runtime checks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use meshlink_session::{Session, SessionState, Transport};

use crate::config::BridgeConfig;
use crate::error::{CommandError, CommandResult};
use crate::types::{MeshDeviceInfo, Protocol};

/// Uniform capability interface over one connected device.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Protocol this adapter drives.
    fn protocol(&self) -> Protocol;

    /// Whether the device is ready for commands.
    fn is_ready(&self) -> bool;

    /// Run the protocol's identification and return the protocol-agnostic
    /// device summary.
    async fn identify(&self) -> CommandResult<MeshDeviceInfo>;

    /// Prove bidirectional reachability and measure latency.
    async fn ping(&self) -> CommandResult<Duration>;

    /// Tear down the device link owned by this adapter.
    async fn disconnect(&self);

    /// Release every resource owned by this adapter.
    async fn dispose(&self);
}

/// Adapter for MeshCore companion radios: a thin pass-through to the
/// session's protocol primitives.
pub struct MeshCoreAdapter {
    session: Session,
    transport: Arc<dyn Transport>,
    config: BridgeConfig,
}

impl MeshCoreAdapter {
    /// Build an adapter over an established session and its transport.
    pub fn new(session: Session, transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        Self {
            session,
            transport,
            config,
        }
    }

    /// The underlying session, for bulk operations (contacts, channels).
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn node_id_hex(public_key: &[u8]) -> String {
        public_key
            .iter()
            .take(4)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

#[async_trait]
impl DeviceAdapter for MeshCoreAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::MeshCore
    }

    fn is_ready(&self) -> bool {
        self.session.state() == SessionState::Active
    }

    async fn identify(&self) -> CommandResult<MeshDeviceInfo> {
        let self_info = self
            .session
            .identify(
                &self.config.app_name,
                self.config.protocol_version,
                self.config.identify_timeout,
            )
            .await?
            .ok_or_else(|| CommandError::timeout("no self info before timeout"))?;

        // The firmware also answers the device query; fold its build
        // strings into the summary when they arrive in time.
        let firmware = match self
            .session
            .get_device_info(self.config.protocol_version, self.config.command_timeout)
            .await
        {
            Ok(info) => info,
            Err(err) => {
                warn!(%err, "device info query failed, continuing without it");
                None
            }
        };

        info!(node = %self_info.node_name, "MeshCore device identified");
        Ok(MeshDeviceInfo {
            protocol: Protocol::MeshCore,
            name: self_info.node_name.clone(),
            node_id: Some(Self::node_id_hex(&self_info.public_key)),
            firmware_version: firmware.as_ref().map(|f| f.firmware_version.clone()),
            hardware: firmware.as_ref().map(|f| f.manufacturer.clone()),
        })
    }

    async fn ping(&self) -> CommandResult<Duration> {
        self.session
            .ping(self.config.command_timeout)
            .await?
            .ok_or_else(|| CommandError::timeout("no battery response before timeout"))
    }

    async fn disconnect(&self) {
        self.session.close();
        if let Err(err) = self.transport.disconnect().await {
            debug!(%err, "transport disconnect error");
        }
    }

    async fn dispose(&self) {
        self.session.close();
        self.transport.dispose().await;
        debug!("MeshCore adapter disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_proto::codes::{CMD_APP_START, PUB_KEY_SIZE, RESP_CODE_SELF_INFO};
    use meshlink_proto::Frame;
    use meshlink_session::testing::MockTransport;
    use meshlink_session::{LinkState, TransportKind};

    fn short_config() -> BridgeConfig {
        BridgeConfig::builder()
            .identify_timeout(Duration::from_millis(200))
            .command_timeout(Duration::from_millis(100))
            .build()
    }

    fn self_info_payload(name: &str) -> Vec<u8> {
        let mut data = vec![1, 22, 30];
        data.extend_from_slice(&[0xA5; PUB_KEY_SIZE]);
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data
    }

    #[tokio::test]
    async fn test_identify_maps_self_info() {
        let transport = MockTransport::connected(TransportKind::Ble);
        transport.set_write_script(Box::new(|written| {
            if written.first() == Some(&CMD_APP_START) {
                vec![MockTransport::device_bytes(
                    TransportKind::Ble,
                    &Frame::new(RESP_CODE_SELF_INFO, self_info_payload("Ridge Node")),
                )]
            } else {
                Vec::new()
            }
        }));

        let session = Session::new(transport.clone());
        let adapter = MeshCoreAdapter::new(session, transport, short_config());

        let info = adapter.identify().await.unwrap();
        assert_eq!(info.protocol, Protocol::MeshCore);
        assert_eq!(info.name, "Ridge Node");
        assert_eq!(info.node_id.as_deref(), Some("a5a5a5a5"));
    }

    #[tokio::test]
    async fn test_identify_times_out_without_self_info() {
        let transport = MockTransport::connected(TransportKind::Ble);
        let session = Session::new(transport.clone());
        let adapter = MeshCoreAdapter::new(session, transport, short_config());

        let err = adapter.identify().await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_dispose_tears_down_session_and_transport() {
        let transport = MockTransport::connected(TransportKind::Ble);
        let session = Session::new(transport.clone());
        let adapter = MeshCoreAdapter::new(session, transport.clone(), short_config());

        assert!(adapter.is_ready());
        adapter.dispose().await;

        assert!(!adapter.is_ready());
        assert_eq!(transport.state(), LinkState::Disconnected);
    }
}
