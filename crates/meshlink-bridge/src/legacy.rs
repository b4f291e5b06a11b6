//! Legacy Meshtastic adapter
//!
//! Meshtastic devices are driven by a pre-existing, independently-maintained
//! engine whose startup and transport lifecycle are owned elsewhere. This
//! module consumes that engine through the narrow [`MeshtasticEngine`]
//! handle and wraps it in the uniform [`DeviceAdapter`] shape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapter::DeviceAdapter;
use crate::config::BridgeConfig;
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::types::{MeshDeviceInfo, Protocol};

/// Nominal latency reported by [`MeshtasticAdapter::ping`]. The engine
/// exposes no protocol-level ping; a successful readiness check proves
/// bidirectional reachability and this stands in for a measurement.
pub const NOMINAL_PING_LATENCY: Duration = Duration::from_millis(50);

/// Narrow handle onto the independently-running Meshtastic engine.
///
/// The engine's handshake is driven elsewhere; this trait only exposes what
/// the adapter needs to observe: whether the engine is up and what identity
/// it has assigned itself.
pub trait MeshtasticEngine: Send + Sync {
    /// Whether the engine's own connection is up.
    fn is_running(&self) -> bool;

    /// The node number the engine has assigned itself, once its handshake
    /// completed.
    fn node_id(&self) -> Option<u32>;

    /// The node's long name, once known.
    fn node_name(&self) -> Option<String>;

    /// Firmware version reported by the radio, once known.
    fn firmware_version(&self) -> Option<String>;
}

/// Shim adapter over the legacy engine.
pub struct MeshtasticAdapter {
    engine: Arc<dyn MeshtasticEngine>,
    grace: Duration,
}

impl MeshtasticAdapter {
    /// Wrap an engine handle.
    pub fn new(engine: Arc<dyn MeshtasticEngine>, config: &BridgeConfig) -> Self {
        Self {
            engine,
            grace: config.legacy_grace,
        }
    }

    fn summary(&self) -> Option<MeshDeviceInfo> {
        let node_id = self.engine.node_id()?;
        let name = self
            .engine
            .node_name()
            .unwrap_or_else(|| format!("Meshtastic {node_id:08x}"));
        Some(MeshDeviceInfo {
            protocol: Protocol::Meshtastic,
            name,
            node_id: Some(format!("{node_id:08x}")),
            firmware_version: self.engine.firmware_version(),
            hardware: None,
        })
    }
}

#[async_trait]
impl DeviceAdapter for MeshtasticAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Meshtastic
    }

    /// Readiness is polled, not pushed: the engine's startup is driven
    /// elsewhere and it signals completion by assigning itself a node id.
    fn is_ready(&self) -> bool {
        self.engine.is_running() && self.engine.node_id().is_some()
    }

    /// Late-joining identification: the engine's handshake is not owned
    /// here, so check whether it already completed, wait one grace period,
    /// and check again.
    async fn identify(&self) -> CommandResult<MeshDeviceInfo> {
        if let Some(info) = self.summary() {
            info!(node = %info.name, "Meshtastic device already identified");
            return Ok(info);
        }

        debug!(grace = ?self.grace, "waiting for legacy engine identity");
        tokio::time::sleep(self.grace).await;

        match self.summary() {
            Some(info) => {
                info!(node = %info.name, "Meshtastic device identified");
                Ok(info)
            }
            None => Err(CommandError::new(
                ErrorKind::ProtocolNotReady,
                "legacy engine has no node identity yet",
            )),
        }
    }

    async fn ping(&self) -> CommandResult<Duration> {
        if !self.is_ready() {
            return Err(CommandError::not_connected("legacy engine not ready"));
        }
        Ok(NOMINAL_PING_LATENCY)
    }

    /// The engine's transport lifecycle is not owned here; there is nothing
    /// to tear down.
    async fn disconnect(&self) {}

    async fn dispose(&self) {
        debug!("Meshtastic adapter disposed");
    }
}
