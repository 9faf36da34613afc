//! In-process radio and indicator for host-side runs.
//!
//! [`SimulatedRadio`] behaves like a single-connection peripheral stack:
//! connecting pauses advertising, writes are delivered to the characteristic's
//! handler, and advertising failures can be scripted.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;
use uuid::Uuid;

use crate::ble::advertising::AdvertisingPayload;
use crate::ble::characteristics::{Characteristic, CharacteristicProperties};
use crate::ble::radio::{
    AdvertisingParameters, LinkCallback, LinkEvent, PeerHandle, RadioStack, StatusCode,
};
use crate::indicator::{Indicator, Rgb};

/// Status returned for operations that need a connection when there is none.
pub const STATUS_INVALID_STATE: StatusCode = StatusCode(-210);
/// Status returned when the characteristic table is full.
pub const STATUS_NO_MEMORY: StatusCode = StatusCode(-260);
/// Status returned for an unknown characteristic.
pub const STATUS_NOT_FOUND: StatusCode = StatusCode(-170);

#[derive(Default)]
struct RadioState {
    enabled: bool,
    characteristics: Vec<Characteristic>,
    params: AdvertisingParameters,
    advertising: bool,
    payload: Option<AdvertisingPayload>,
    advertise_calls: usize,
    scripted_statuses: VecDeque<StatusCode>,
    connected: Option<PeerHandle>,
    link_callback: Option<LinkCallback>,
    notifications: Vec<(Uuid, Vec<u8>)>,
}

/// A simulated single-connection BLE radio.
pub struct SimulatedRadio {
    max_characteristics: usize,
    state: Mutex<RadioState>,
}

impl SimulatedRadio {
    /// Create a radio that holds up to `max_characteristics` characteristics.
    pub fn new(max_characteristics: usize) -> Self {
        Self {
            max_characteristics,
            state: Mutex::new(RadioState::default()),
        }
    }

    /// Make the next `advertise` call return `status`.
    pub fn fail_next_advertise(&self, status: StatusCode) {
        self.state.lock().scripted_statuses.push_back(status);
    }

    /// Simulate a central connecting.
    pub fn connect(&self, peer: PeerHandle) {
        let callback = {
            let mut state = self.state.lock();
            state.connected = Some(peer);
            state.advertising = false;
            state.link_callback.clone()
        };

        if let Some(callback) = callback {
            callback(LinkEvent::Connected(peer));
        }
    }

    /// Simulate the central disconnecting.
    pub fn disconnect(&self, peer: PeerHandle) {
        let callback = {
            let mut state = self.state.lock();
            if state.connected != Some(peer) {
                return;
            }
            state.connected = None;
            state.link_callback.clone()
        };

        if let Some(callback) = callback {
            callback(LinkEvent::Disconnected(peer));
        }
    }

    /// Deliver a link event without touching the simulated link.
    pub fn emit_link_event(&self, event: LinkEvent) {
        let callback = self.state.lock().link_callback.clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    /// Simulate a central writing to a characteristic.
    ///
    /// Returns `false` if no writable characteristic with that UUID exists.
    pub fn write(&self, uuid: Uuid, data: &[u8], peer: PeerHandle) -> bool {
        let handler = {
            let state = self.state.lock();
            state
                .characteristics
                .iter()
                .find(|c| c.uuid == uuid && c.properties.is_writable())
                .and_then(|c| c.on_write.clone())
        };

        match handler {
            Some(handler) => {
                handler(data, peer);
                true
            }
            None => false,
        }
    }

    /// Check if the radio is powered.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Check if the radio is advertising.
    pub fn is_advertising(&self) -> bool {
        self.state.lock().advertising
    }

    /// The payload passed to the last successful `advertise`.
    pub fn payload(&self) -> Option<AdvertisingPayload> {
        self.state.lock().payload.clone()
    }

    /// Number of `advertise` calls, successful or not.
    pub fn advertise_calls(&self) -> usize {
        self.state.lock().advertise_calls
    }

    /// Registered characteristics as `(name, uuid, properties)`.
    pub fn characteristics(&self) -> Vec<(String, Uuid, CharacteristicProperties)> {
        self.state
            .lock()
            .characteristics
            .iter()
            .map(|c| (c.name.clone(), c.uuid, c.properties))
            .collect()
    }

    /// Notifications sent so far.
    pub fn notifications(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.lock().notifications.clone()
    }
}

impl RadioStack for SimulatedRadio {
    fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.enabled = enabled;
        if !enabled {
            state.advertising = false;
        }
    }

    fn max_characteristics(&self) -> usize {
        self.max_characteristics
    }

    fn add_characteristic(&self, characteristic: &Characteristic) -> StatusCode {
        let mut state = self.state.lock();
        if state.characteristics.len() >= self.max_characteristics {
            return STATUS_NO_MEMORY;
        }
        state.characteristics.push(characteristic.clone());
        StatusCode::SUCCESS
    }

    fn advertising_parameters(&self) -> AdvertisingParameters {
        self.state.lock().params
    }

    fn set_advertising_parameters(&self, params: &AdvertisingParameters) -> StatusCode {
        self.state.lock().params = *params;
        StatusCode::SUCCESS
    }

    fn advertise(&self, payload: &AdvertisingPayload) -> StatusCode {
        let mut state = self.state.lock();
        state.advertise_calls += 1;

        if let Some(status) = state.scripted_statuses.pop_front() {
            if !status.is_success() {
                return status;
            }
        }
        if !state.enabled || state.connected.is_some() {
            return STATUS_INVALID_STATE;
        }

        trace!("Simulated radio advertising {:02X?}", payload.to_bytes());
        state.advertising = true;
        state.payload = Some(payload.clone());
        StatusCode::SUCCESS
    }

    fn stop_advertising(&self) -> StatusCode {
        self.state.lock().advertising = false;
        StatusCode::SUCCESS
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected.is_some()
    }

    fn notify(&self, characteristic: Uuid, data: &[u8]) -> StatusCode {
        let mut state = self.state.lock();
        if state.connected.is_none() {
            return STATUS_INVALID_STATE;
        }
        let notifiable = state.characteristics.iter().any(|c| {
            c.uuid == characteristic && c.properties.contains(CharacteristicProperties::NOTIFY)
        });
        if !notifiable {
            return STATUS_NOT_FOUND;
        }
        state.notifications.push((characteristic, data.to_vec()));
        StatusCode::SUCCESS
    }

    fn subscribe_link_events(&self, callback: LinkCallback) {
        self.state.lock().link_callback = Some(callback);
    }
}

#[derive(Debug, Default)]
struct IndicatorState {
    controlled: bool,
    colors: Vec<Rgb>,
    releases: usize,
}

/// Indicator that records what it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    state: Mutex<IndicatorState>,
}

impl RecordingIndicator {
    /// Create an indicator under system control.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the application holds control.
    pub fn is_controlled(&self) -> bool {
        self.state.lock().controlled
    }

    /// Colours set so far.
    pub fn colors(&self) -> Vec<Rgb> {
        self.state.lock().colors.clone()
    }

    /// Number of times control was released after being held.
    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }
}

impl Indicator for RecordingIndicator {
    fn set_control(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.controlled && !enabled {
            state.releases += 1;
        }
        state.controlled = enabled;
    }

    fn set_color(&self, color: Rgb) {
        self.state.lock().colors.push(color);
    }
}
