//! Peripheral configuration.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::advertising::LEGACY_ADV_MAX_LEN;
use crate::ble::uuids::{DEVICE_NAME, RX_UUID, SERVICE_UUID, TX_UUID};

/// Configuration for a [`PeripheralController`](crate::PeripheralController).
///
/// `Default` reproduces the stock firmware behaviour.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeripheralConfig {
    /// Local name placed in the advertising payload.
    pub device_name: String,
    /// Service UUID advertised and owning both characteristics.
    pub service_uuid: Uuid,
    /// RX characteristic UUID (write without response).
    pub rx_uuid: Uuid,
    /// TX characteristic UUID (notify).
    pub tx_uuid: Uuid,
    /// Factor applied to the radio's default advertising interval.
    pub interval_scale: u32,
    /// Advertising packet data limit in bytes.
    pub payload_limit: usize,
    /// How long the indicator stays lit after a write.
    pub indicator_duration: Duration,
    /// Period between status log lines.
    pub status_interval: Duration,
    /// Tick period of the background loop.
    pub poll_period: Duration,
    /// Resume advertising once the central disconnects.
    pub readvertise_on_disconnect: bool,
    /// Largest notification payload accepted by `notify`.
    pub max_notify_len: usize,
    /// Seed for the indicator colour generator. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl PeripheralConfig {
    /// Default advertising interval multiplier.
    pub const DEFAULT_INTERVAL_SCALE: u32 = 4;
    /// Default indicator duration (3 s).
    pub const DEFAULT_INDICATOR_DURATION: Duration = Duration::from_millis(3000);
    /// Default status report period (10 s).
    pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(10);
    /// Default loop tick (10 ms).
    pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(10);
    /// Default notification limit (ATT MTU 247 minus the 3-byte header).
    pub const DEFAULT_MAX_NOTIFY_LEN: usize = 244;

    /// Set the advertised local name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the service and characteristic UUIDs.
    pub fn with_uuids(mut self, service: Uuid, rx: Uuid, tx: Uuid) -> Self {
        self.service_uuid = service;
        self.rx_uuid = rx;
        self.tx_uuid = tx;
        self
    }

    /// Set the advertising interval multiplier.
    pub fn with_interval_scale(mut self, scale: u32) -> Self {
        self.interval_scale = scale;
        self
    }

    /// Set the advertising payload limit.
    pub fn with_payload_limit(mut self, limit: usize) -> Self {
        self.payload_limit = limit;
        self
    }

    /// Set how long the indicator stays lit after a write.
    pub fn with_indicator_duration(mut self, duration: Duration) -> Self {
        self.indicator_duration = duration;
        self
    }

    /// Set the status report period.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Set the background loop tick.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Enable or disable re-advertising after a disconnect.
    pub fn with_readvertise_on_disconnect(mut self, enabled: bool) -> Self {
        self.readvertise_on_disconnect = enabled;
        self
    }

    /// Set the largest notification payload.
    pub fn with_max_notify_len(mut self, len: usize) -> Self {
        self.max_notify_len = len;
        self
    }

    /// Seed the indicator colour generator.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            service_uuid: SERVICE_UUID,
            rx_uuid: RX_UUID,
            tx_uuid: TX_UUID,
            interval_scale: Self::DEFAULT_INTERVAL_SCALE,
            payload_limit: LEGACY_ADV_MAX_LEN,
            indicator_duration: Self::DEFAULT_INDICATOR_DURATION,
            status_interval: Self::DEFAULT_STATUS_INTERVAL,
            poll_period: Self::DEFAULT_POLL_PERIOD,
            readvertise_on_disconnect: true,
            max_notify_len: Self::DEFAULT_MAX_NOTIFY_LEN,
            rng_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware() {
        let config = PeripheralConfig::default();
        assert_eq!(config.device_name, "partible");
        assert_eq!(config.service_uuid, SERVICE_UUID);
        assert_eq!(config.interval_scale, 4);
        assert_eq!(config.indicator_duration, Duration::from_millis(3000));
        assert_eq!(config.status_interval, Duration::from_secs(10));
        assert_eq!(config.payload_limit, 31);
        assert!(config.readvertise_on_disconnect);
    }

    #[test]
    fn test_builders() {
        let config = PeripheralConfig::default()
            .with_device_name("bench")
            .with_interval_scale(2)
            .with_readvertise_on_disconnect(false)
            .with_rng_seed(42);

        assert_eq!(config.device_name, "bench");
        assert_eq!(config.interval_scale, 2);
        assert!(!config.readvertise_on_disconnect);
        assert_eq!(config.rng_seed, Some(42));
    }
}
