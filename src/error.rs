//! Error types for the partible-peripheral crate.

use thiserror::Error;
use uuid::Uuid;

use crate::ble::radio::StatusCode;

/// The main error type for this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A characteristic with the same UUID is already registered.
    #[error("Characteristic already registered: {uuid}")]
    DuplicateUuid {
        /// The UUID that was registered twice.
        uuid: Uuid,
    },

    /// The radio stack cannot hold any more characteristics.
    #[error("Characteristic capacity ({max}) exceeded")]
    CapacityExceeded {
        /// The maximum number of characteristics the radio supports.
        max: usize,
    },

    /// The operation is not allowed in the current state.
    #[error("Invalid state for {operation}: {state}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// Description of the state that rejected it.
        state: String,
    },

    /// The advertising payload cannot fit within the packet limit.
    #[error("Advertising payload too large: {required} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Bytes needed for the mandatory fields.
        required: usize,
        /// The advertising packet limit.
        limit: usize,
    },

    /// The radio stack refused to start advertising.
    #[error("Advertising failed with status {status}")]
    AdvertiseFailed {
        /// The raw status code reported by the radio stack.
        status: StatusCode,
    },

    /// Any other radio stack call failed.
    #[error("Radio {operation} failed with status {status}")]
    Radio {
        /// The radio operation that failed.
        operation: &'static str,
        /// The raw status code reported by the radio stack.
        status: StatusCode,
    },

    /// Operation requires a connected central.
    #[error("No central connected")]
    NotConnected,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

impl Error {
    /// Whether the outer control loop may retry the failed operation later.
    ///
    /// Registration and payload errors are fatal to startup; advertising
    /// failures and radio hiccups are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AdvertiseFailed { .. } | Self::Radio { .. } | Self::NotConnected
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
