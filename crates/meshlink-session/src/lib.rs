//! Transport abstraction and session engine for MeshCore companion radios
//!
//! This crate turns an unreliable BLE or serial byte pipe into a framed,
//! bidirectional request/response session:
//!
//! 1. **Transport** - [`Transport`] is the byte-pipe contract the platform
//!    BLE/serial layer implements. Feature-gated implementations are
//!    provided for serial ports (`serial`) and btleplug peripherals
//!    (`ble`); tests use the in-memory [`testing::MockTransport`].
//! 2. **Session** - [`Session`] owns one transport plus the framing codec
//!    matched to its kind, correlates responses with requests through
//!    single-flight **waiters**, and broadcasts every decoded frame to
//!    passive listeners.
//!
//! # Correlation rules
//!
//! - A waiter is registered *before* its command is sent, closing the race
//!   where a fast reply arrives before anyone is listening.
//! - At most one waiter may be pending per response code; a second
//!   registration fails immediately as a logic error.
//! - Push codes (`0x80..`) cannot be waited on, and push frames never
//!   complete a waiter.
//! - Status/ack frames answer "command accepted", never "here is your
//!   data": they are published on a dedicated status stream and complete
//!   zero waiters.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use meshlink_session::{Session, testing::MockTransport, TransportKind};
//!
//! # async fn run() -> meshlink_session::Result<()> {
//! let transport = MockTransport::connected(TransportKind::Ble);
//! let session = Session::new(transport);
//!
//! if let Some(info) = session.identify("my-app", 3, Duration::from_secs(5)).await? {
//!     println!("connected to {}", info.node_name);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod session;
pub mod testing;
pub mod transport;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "ble")]
pub mod ble;

pub use error::{Result, SessionError, TransportError};
pub use session::{
    CapturedFrame, ContactList, FrameDirection, ResponseWaiter, Session, SessionState,
};
pub use transport::{LinkState, Transport, TransportKind, MESHCORE_SERVICE_UUID};

#[cfg(feature = "serial")]
pub use serial::{list_ports, SerialTransport};

#[cfg(feature = "ble")]
pub use ble::BleTransport;
