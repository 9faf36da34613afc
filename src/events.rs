//! Events broadcast by the peripheral.

use bytes::Bytes;

use crate::ble::radio::PeerHandle;

/// Something observable happened on the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// Advertising started (or restarted).
    AdvertisingStarted,
    /// Advertising was stopped explicitly.
    AdvertisingStopped,
    /// A central connected.
    Connected(PeerHandle),
    /// The central disconnected.
    Disconnected(PeerHandle),
    /// The RX characteristic was written.
    DataReceived {
        /// Writing central.
        peer: PeerHandle,
        /// Copy of the written bytes.
        data: Bytes,
    },
    /// The indicator effect armed by a write has expired.
    IndicatorReset,
}

impl std::fmt::Display for PeripheralEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdvertisingStarted => write!(f, "advertising started"),
            Self::AdvertisingStopped => write!(f, "advertising stopped"),
            Self::Connected(peer) => write!(f, "{} connected", peer),
            Self::Disconnected(peer) => write!(f, "{} disconnected", peer),
            Self::DataReceived { peer, data } => {
                write!(f, "{} bytes from {}", data.len(), peer)
            }
            Self::IndicatorReset => write!(f, "indicator reset"),
        }
    }
}
