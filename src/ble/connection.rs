//! Connection state tracking.
//!
//! The radio stack drives connect/disconnect transitions from its own event
//! context; the tracker mirrors them so the application loop can report
//! status without touching the radio.

use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::ble::radio::PeerHandle;
use crate::events::PeripheralEvent;

/// Connection state of the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No central connected.
    #[default]
    Disconnected,
    /// A central is connected.
    Connected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

const CONNECTED_BIT: u32 = 1 << 16;
const DISCONNECTED: u32 = 0;

fn pack(peer: PeerHandle) -> u32 {
    CONNECTED_BIT | u32::from(peer.0)
}

/// Mirrors the radio's connection state.
///
/// State and peer live in one atomic word so a concurrent reader never sees a
/// connected state paired with a stale peer.
pub struct ConnectionStateTracker {
    link: AtomicU32,
    event_tx: broadcast::Sender<PeripheralEvent>,
}

impl ConnectionStateTracker {
    /// Create a tracker in the disconnected state.
    pub fn new(event_tx: broadcast::Sender<PeripheralEvent>) -> Self {
        Self {
            link: AtomicU32::new(DISCONNECTED),
            event_tx,
        }
    }

    /// A central connected.
    pub fn on_connect(&self, peer: PeerHandle) {
        let previous = self.link.swap(pack(peer), Ordering::SeqCst);
        if previous == pack(peer) {
            return;
        }

        info!("Central connected: {}", peer);
        let _ = self.event_tx.send(PeripheralEvent::Connected(peer));
    }

    /// A central disconnected. Ignored if `peer` is not the tracked central.
    ///
    /// Returns `true` if the tracked link went down.
    pub fn on_disconnect(&self, peer: PeerHandle) -> bool {
        match self.link.compare_exchange(
            pack(peer),
            DISCONNECTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                info!("Central disconnected: {}", peer);
                let _ = self.event_tx.send(PeripheralEvent::Disconnected(peer));
                true
            }
            Err(current) => {
                debug!(
                    "Ignoring disconnect for {} (tracked link {:#07x})",
                    peer, current
                );
                false
            }
        }
    }

    /// Check if a central is connected.
    pub fn is_connected(&self) -> bool {
        self.link.load(Ordering::SeqCst) & CONNECTED_BIT != 0
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// The connected central, if any.
    pub fn peer(&self) -> Option<PeerHandle> {
        self.snapshot().1
    }

    /// State and peer read together.
    pub fn snapshot(&self) -> (ConnectionState, Option<PeerHandle>) {
        let link = self.link.load(Ordering::SeqCst);
        if link & CONNECTED_BIT != 0 {
            (ConnectionState::Connected, Some(PeerHandle(link as u16)))
        } else {
            (ConnectionState::Disconnected, None)
        }
    }
}
