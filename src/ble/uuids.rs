//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants for the single service this peripheral exposes.

use uuid::Uuid;

// UART-style service (Nordic NUS layout)
/// Peripheral service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// RX characteristic UUID (central writes to the peripheral).
pub const RX_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
/// TX characteristic UUID (notifications to the central).
pub const TX_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e);

/// Local name placed in the advertising payload.
pub const DEVICE_NAME: &str = "partible";

const BASE: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

/// The Bluetooth Base UUID, `00000000-0000-1000-8000-00805F9B34FB`.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(BASE);

/// Build a full UUID from a SIG-assigned 16-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BASE | ((short as u128) << 96))
}

/// Return the 16-bit alias of a UUID derived from the Bluetooth Base UUID.
pub fn as_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let mask: u128 = !(0xffff_u128 << 96);
    if value & mask == BASE {
        Some((value >> 96) as u16)
    } else {
        None
    }
}
