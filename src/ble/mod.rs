//! BLE peripheral module.
//!
//! This module provides the building blocks the peripheral controller wires
//! together: the radio stack interface, characteristic registration,
//! advertising and connection tracking.

pub mod advertising;
pub mod characteristics;
pub mod connection;
pub mod radio;
pub mod uuids;

pub use advertising::{AdvertisingController, AdvertisingPayload, AdvertisingState};
pub use characteristics::{Characteristic, CharacteristicProperties, CharacteristicRegistry};
pub use connection::{ConnectionState, ConnectionStateTracker};
pub use radio::{AdvertisingParameters, LinkEvent, PeerHandle, RadioStack, StatusCode};
pub use uuids::*;
