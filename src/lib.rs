// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # partible-peripheral
//!
//! The core of a minimal Bluetooth Low Energy peripheral: one UART-style
//! service with a writable RX characteristic and a notifying TX
//! characteristic, advertised under the name `partible`.
//!
//! Writes on RX are logged, light an RGB indicator in a random colour, and
//! arm a single timed effect that the application loop expires three
//! seconds later. Connection state is mirrored from radio callbacks for
//! periodic status reporting.
//!
//! The radio stack and the indicator are external collaborators behind the
//! [`RadioStack`] and [`Indicator`] traits. [`sim`] provides in-process
//! implementations of both.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use partible_peripheral::sim::{RecordingIndicator, SimulatedRadio};
//! use partible_peripheral::{PeripheralConfig, PeripheralController, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let radio = Arc::new(SimulatedRadio::new(8));
//!     let indicator = Arc::new(RecordingIndicator::new());
//!     let peripheral = Arc::new(PeripheralController::new(
//!         radio,
//!         indicator,
//!         PeripheralConfig::default(),
//!     ));
//!
//!     peripheral.setup()?;
//!     peripheral.start_loop().await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!
//!     peripheral.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration and value types

// Public modules
pub mod ble;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod indicator;
pub mod peripheral;
pub mod sim;

// Re-exports for convenience
pub use config::PeripheralConfig;
pub use dispatcher::{DispatchStats, InboundDataDispatcher, PendingEffect};
pub use error::{Error, Result};
pub use events::PeripheralEvent;
pub use indicator::{Indicator, Rgb};
pub use peripheral::{CallbackHandle, PeripheralController, PollOutcome};

// Re-export commonly used types from submodules
pub use ble::advertising::{AdvertisingPayload, AdvertisingState};
pub use ble::characteristics::{Characteristic, CharacteristicProperties};
pub use ble::connection::ConnectionState;
pub use ble::radio::{AdvertisingParameters, LinkEvent, PeerHandle, RadioStack, StatusCode};
