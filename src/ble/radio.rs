//! Radio stack interface.
//!
//! The BLE controller/driver is an external collaborator. This module defines
//! the narrow surface the peripheral core consumes from it, plus the value
//! types that cross that boundary.

use std::sync::Arc;

use uuid::Uuid;

use crate::ble::advertising::AdvertisingPayload;
use crate::ble::characteristics::Characteristic;

/// Raw status code returned by the radio stack. Zero means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusCode(pub i32);

impl StatusCode {
    /// The success status.
    pub const SUCCESS: StatusCode = StatusCode(0);

    /// Check if this status reports success.
    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    /// Convert into a `Result`, keeping the raw code on failure.
    pub fn check(self) -> std::result::Result<(), StatusCode> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection handle of the remote central, as assigned by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerHandle(pub u16);

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Advertising timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertisingParameters {
    /// Advertising interval in 0.625 ms units.
    pub interval: u16,
    /// Advertising timeout in 10 ms units (0 = advertise until stopped).
    pub timeout: u16,
}

impl AdvertisingParameters {
    /// Smallest legal advertising interval (20 ms).
    pub const MIN_INTERVAL: u16 = 0x0020;
    /// Largest legal advertising interval (10.24 s).
    pub const MAX_INTERVAL: u16 = 0x4000;
    /// Interval used when the radio has not been configured (100 ms).
    pub const DEFAULT_INTERVAL: u16 = 160;

    /// Advertising interval in milliseconds.
    pub fn interval_ms(&self) -> f64 {
        f64::from(self.interval) * 0.625
    }
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            timeout: 0,
        }
    }
}

/// Link-layer connection event reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A central connected.
    Connected(PeerHandle),
    /// A central disconnected.
    Disconnected(PeerHandle),
}

/// Callback invoked by the radio stack when a characteristic is written.
///
/// Runs in radio event context: it must not block, and the data slice is only
/// valid for the duration of the call.
pub type WriteCallback = Arc<dyn Fn(&[u8], PeerHandle) + Send + Sync>;

/// Callback invoked by the radio stack on connection changes.
pub type LinkCallback = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// The BLE radio stack consumed by the peripheral core.
///
/// Implementations must be callable from both the application loop and the
/// radio event context.
#[cfg_attr(test, mockall::automock)]
pub trait RadioStack: Send + Sync {
    /// Power the radio on or off.
    fn set_enabled(&self, enabled: bool);

    /// Maximum number of characteristics the stack can hold.
    fn max_characteristics(&self) -> usize;

    /// Add a characteristic to the GATT table.
    fn add_characteristic(&self, characteristic: &Characteristic) -> StatusCode;

    /// Read the current advertising parameters.
    fn advertising_parameters(&self) -> AdvertisingParameters;

    /// Apply advertising parameters.
    fn set_advertising_parameters(&self, params: &AdvertisingParameters) -> StatusCode;

    /// Begin advertising the given payload.
    fn advertise(&self, payload: &AdvertisingPayload) -> StatusCode;

    /// Stop advertising. Must succeed when not advertising.
    fn stop_advertising(&self) -> StatusCode;

    /// Whether a central is connected at the link layer.
    fn is_connected(&self) -> bool;

    /// Send a notification on a characteristic.
    fn notify(&self, characteristic: Uuid, data: &[u8]) -> StatusCode;

    /// Register the connection-change callback.
    fn subscribe_link_events(&self, callback: LinkCallback);
}
