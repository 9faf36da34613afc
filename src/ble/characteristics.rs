//! GATT characteristic definitions and registration.
//!
//! Characteristics are created once at startup and registered before
//! advertising begins. The registry enforces UUID uniqueness and the radio
//! stack's capacity limit.

use std::ops::{BitOr, BitOrAssign};

use tracing::debug;
use uuid::Uuid;

use crate::ble::radio::WriteCallback;
use crate::error::{Error, Result};

/// GATT characteristic property flags (Bluetooth Core Vol 3, Part G, 3.3.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    /// No properties.
    pub const NONE: Self = Self(0x00);
    /// Broadcast.
    pub const BROADCAST: Self = Self(0x01);
    /// Read.
    pub const READ: Self = Self(0x02);
    /// Write without response.
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    /// Write with response.
    pub const WRITE: Self = Self(0x08);
    /// Notify.
    pub const NOTIFY: Self = Self(0x10);
    /// Indicate.
    pub const INDICATE: Self = Self(0x20);

    /// Create from the raw property byte.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Get the raw property byte.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check whether all flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether a central may write this characteristic.
    pub const fn is_writable(&self) -> bool {
        self.0 & (Self::WRITE.0 | Self::WRITE_WITHOUT_RESPONSE.0) != 0
    }
}

impl BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CharacteristicProperties {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A GATT service exposed by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDescriptor {
    /// Service UUID.
    pub uuid: Uuid,
    /// Human-readable service name.
    pub name: String,
}

impl ServiceDescriptor {
    /// Create a new service descriptor.
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
        }
    }
}

/// A characteristic definition.
#[derive(Clone)]
pub struct Characteristic {
    /// Short description, e.g. `"rx"`.
    pub name: String,
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the owning service.
    pub service_uuid: Uuid,
    /// Declared properties.
    pub properties: CharacteristicProperties,
    /// Handler for inbound writes.
    pub on_write: Option<WriteCallback>,
}

impl Characteristic {
    /// Create a characteristic without a write handler.
    pub fn new(
        name: impl Into<String>,
        properties: CharacteristicProperties,
        uuid: Uuid,
        service_uuid: Uuid,
    ) -> Self {
        Self {
            name: name.into(),
            uuid,
            service_uuid,
            properties,
            on_write: None,
        }
    }

    /// Attach a write handler.
    pub fn with_write_handler(mut self, handler: WriteCallback) -> Self {
        self.on_write = Some(handler);
        self
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .field("service_uuid", &self.service_uuid)
            .field("properties", &self.properties)
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

/// Opaque handle to a registered characteristic (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicHandle(u16);

impl CharacteristicHandle {
    /// Get the raw handle value.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

/// Holds the characteristics of the advertised service.
pub struct CharacteristicRegistry {
    characteristics: Vec<Characteristic>,
    capacity: usize,
    sealed: bool,
}

impl CharacteristicRegistry {
    /// Create a registry bounded by the radio stack's characteristic limit.
    pub fn new(capacity: usize) -> Self {
        Self {
            characteristics: Vec::with_capacity(capacity),
            capacity,
            sealed: false,
        }
    }

    /// Register a characteristic.
    ///
    /// # Errors
    ///
    /// `InvalidState` after advertising has started, `DuplicateUuid` if the
    /// UUID is already present, `CapacityExceeded` when full, and
    /// `InvalidParameter` for a write handler on a read-only characteristic.
    pub fn register(&mut self, characteristic: Characteristic) -> Result<CharacteristicHandle> {
        if self.sealed {
            return Err(Error::InvalidState {
                operation: "register",
                state: "advertising already started".to_string(),
            });
        }

        if self.find_by_uuid(&characteristic.uuid).is_some() {
            return Err(Error::DuplicateUuid {
                uuid: characteristic.uuid,
            });
        }

        if self.characteristics.len() >= self.capacity {
            return Err(Error::CapacityExceeded { max: self.capacity });
        }

        if characteristic.on_write.is_some() && !characteristic.properties.is_writable() {
            return Err(Error::InvalidParameter {
                name: "properties".to_string(),
                value: format!("{:#04x}", characteristic.properties.bits()),
            });
        }

        debug!(
            "Registered characteristic '{}' ({}) in service {}",
            characteristic.name, characteristic.uuid, characteristic.service_uuid
        );

        self.characteristics.push(characteristic);
        Ok(CharacteristicHandle(self.characteristics.len() as u16))
    }

    /// Remove the most recent registration (used when the radio rejects it).
    pub(crate) fn rollback(&mut self, handle: CharacteristicHandle) {
        if usize::from(handle.0) == self.characteristics.len() {
            self.characteristics.pop();
        }
    }

    /// Reject further registrations.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Check if the registry has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Get a characteristic by handle.
    pub fn get(&self, handle: CharacteristicHandle) -> Option<&Characteristic> {
        usize::from(handle.0)
            .checked_sub(1)
            .and_then(|index| self.characteristics.get(index))
    }

    /// Find a characteristic by UUID.
    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }

    /// Number of registered characteristics.
    pub fn len(&self) -> usize {
        self.characteristics.len()
    }

    /// Check if no characteristics are registered.
    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }

    /// Iterate registered characteristics in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.iter()
    }
}
