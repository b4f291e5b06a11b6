//! Protocol bridge for mesh radios
//!
//! This crate is the top of the meshlink stack: it decides which of two
//! incompatible protocols (MeshCore, Meshtastic) a discovered radio speaks,
//! drives one connection attempt at a time through the matching transport
//! and adapter, and publishes connection-state transitions to the
//! application shell.
//!
//! # Architecture
//!
//! ```text
//! scan result
//!     │
//!     ▼
//! ProtocolDetector ──── classify ───► protocol locked for the attempt
//!     │
//!     ▼
//! ConnectionCoordinator
//!     ├── MeshCore: TransportFactory → Session → MeshCoreAdapter
//!     └── Meshtastic/Unknown: engine handle → MeshtasticAdapter (shim)
//!     │
//!     ▼
//! identify() ──► ConnectionResult + ConnectionState broadcast
//! ```
//!
//! The two adapters implement one [`DeviceAdapter`] contract and never
//! touch each other's resources; construction is factory-injected so tests
//! can substitute recording factories and prove the isolation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshlink_bridge::{BridgeConfig, ConnectionCoordinator, DiscoveredDevice};
//!
//! let coordinator = ConnectionCoordinator::new(BridgeConfig::default(), transport_factory)
//!     .with_engine(engine_handle);
//!
//! let mut states = coordinator.subscribe();
//! let result = coordinator.connect(&device).await;
//! if result.success {
//!     let adapter = coordinator.adapter().unwrap();
//!     println!("latency: {:?}", adapter.ping().await);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod legacy;
pub mod types;

pub use adapter::{DeviceAdapter, MeshCoreAdapter};
pub use config::{BridgeConfig, BridgeConfigBuilder, DEFAULT_APP_NAME, DEFAULT_PROTOCOL_VERSION};
pub use coordinator::{
    ConnectionCoordinator, DefaultLegacyAdapterFactory, DefaultMeshCoreAdapterFactory,
    LegacyAdapterFactory, MeshCoreAdapterFactory, TransportFactory,
};
pub use detect::{ProtocolDetector, MESHTASTIC_SERVICE_UUID};
pub use error::{CommandError, CommandResult, ErrorKind};
pub use legacy::{MeshtasticAdapter, MeshtasticEngine, NOMINAL_PING_LATENCY};
pub use types::{
    ConnectionResult, ConnectionState, DiscoveredDevice, MeshDeviceInfo, Protocol,
    ProtocolDetection,
};

// The MeshCore service identifier lives with the transport contract.
pub use meshlink_session::MESHCORE_SERVICE_UUID;
