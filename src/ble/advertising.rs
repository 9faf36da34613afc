//! Advertising payload encoding and advertising lifecycle.
//!
//! The payload is a sequence of AD structures (`[len][type][data]`), built
//! fresh for every advertising start. The controller tracks the
//! Idle/Advertising/Connected state machine and drives the radio stack.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::radio::{AdvertisingParameters, RadioStack};
use crate::ble::uuids::as_u16;
use crate::error::{Error, Result};

/// Maximum length of a legacy advertising packet's data.
pub const LEGACY_ADV_MAX_LEN: usize = 31;

/// Largest data an AD structure can carry; the length byte covers type + data.
pub const MAX_AD_DATA_LEN: usize = u8::MAX as usize - 1;

/// AD structure type (Bluetooth Assigned Numbers, "Common Data Types").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdType(u8);

impl AdType {
    /// Flags.
    pub const FLAGS: AdType = AdType(0x01);
    /// Complete list of 16-bit service UUIDs.
    pub const COMPLETE_16_SERVICE_LIST: AdType = AdType(0x03);
    /// Complete list of 128-bit service UUIDs.
    pub const COMPLETE_128_SERVICE_LIST: AdType = AdType(0x07);
    /// Shortened local name.
    pub const SHORT_NAME: AdType = AdType(0x08);
    /// Complete local name.
    pub const FULL_NAME: AdType = AdType(0x09);

    /// Get the raw type byte.
    pub const fn to_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for AdType {
    fn from(value: u8) -> Self {
        AdType(value)
    }
}

/// One AD structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdField {
    /// Field type.
    pub ad_type: AdType,
    /// Field data, without length or type bytes.
    pub data: Vec<u8>,
}

impl AdField {
    /// Encoded size: length byte + type byte + data.
    pub fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }
}

/// Ordered advertising data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingPayload {
    fields: Vec<AdField>,
}

impl AdvertisingPayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Data beyond [`MAX_AD_DATA_LEN`] is dropped.
    pub fn push(&mut self, ad_type: AdType, data: impl Into<Vec<u8>>) {
        let mut data = data.into();
        if data.len() > MAX_AD_DATA_LEN {
            warn!(
                "AD field {:#04x} truncated from {} to {} bytes",
                ad_type.to_u8(),
                data.len(),
                MAX_AD_DATA_LEN
            );
            data.truncate(MAX_AD_DATA_LEN);
        }
        self.fields.push(AdField { ad_type, data });
    }

    /// The fields in order.
    pub fn fields(&self) -> &[AdField] {
        &self.fields
    }

    /// Find the first field of a type.
    pub fn field(&self, ad_type: AdType) -> Option<&AdField> {
        self.fields.iter().find(|f| f.ad_type == ad_type)
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.fields.iter().map(AdField::encoded_len).sum()
    }

    /// Check if the payload has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encode to the on-air byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for field in &self.fields {
            out.push(u8::try_from(field.data.len() + 1).unwrap_or(u8::MAX));
            out.push(field.ad_type.to_u8());
            out.extend_from_slice(&field.data);
        }
        out
    }

    /// The local name carried by the payload, complete or shortened.
    pub fn local_name(&self) -> Option<String> {
        self.field(AdType::FULL_NAME)
            .or_else(|| self.field(AdType::SHORT_NAME))
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }
}

/// Build a legacy advertising payload: service UUID first, then local name.
///
/// See [`build_payload_with_limit`].
pub fn build_payload(service_uuid: &Uuid, local_name: &str) -> Result<AdvertisingPayload> {
    build_payload_with_limit(service_uuid, local_name, LEGACY_ADV_MAX_LEN)
}

/// Build an advertising payload bounded by `limit` bytes.
///
/// The service UUID is never dropped. If the name does not fit it is truncated
/// on a character boundary and emitted as a shortened local name; if no part
/// of it fits it is omitted.
///
/// # Errors
///
/// `PayloadTooLarge` if the service UUID field alone exceeds `limit`.
pub fn build_payload_with_limit(
    service_uuid: &Uuid,
    local_name: &str,
    limit: usize,
) -> Result<AdvertisingPayload> {
    let mut payload = AdvertisingPayload::new();

    match as_u16(service_uuid) {
        Some(short) => payload.push(AdType::COMPLETE_16_SERVICE_LIST, short.to_le_bytes()),
        None => {
            let mut bytes = *service_uuid.as_bytes();
            bytes.reverse();
            payload.push(AdType::COMPLETE_128_SERVICE_LIST, bytes);
        }
    }

    if payload.len() > limit {
        return Err(Error::PayloadTooLarge {
            required: payload.len(),
            limit,
        });
    }

    if local_name.is_empty() {
        return Ok(payload);
    }

    let available = limit
        .saturating_sub(payload.len() + 2)
        .min(MAX_AD_DATA_LEN);
    if local_name.len() <= available {
        payload.push(AdType::FULL_NAME, local_name.as_bytes());
    } else {
        let mut cut = available;
        while cut > 0 && !local_name.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut > 0 {
            debug!(
                "Local name '{}' shortened to {} bytes to fit advertising packet",
                local_name, cut
            );
            payload.push(AdType::SHORT_NAME, &local_name.as_bytes()[..cut]);
        } else {
            warn!("No room for local name '{}' in advertising packet", local_name);
        }
    }

    Ok(payload)
}

/// Scale the advertising interval, saturating into the legal range.
pub fn compute_parameters(base: AdvertisingParameters, scale: u32) -> AdvertisingParameters {
    let scaled = u32::from(base.interval).saturating_mul(scale);
    let interval = scaled.clamp(
        u32::from(AdvertisingParameters::MIN_INTERVAL),
        u32::from(AdvertisingParameters::MAX_INTERVAL),
    ) as u16;

    if u32::from(interval) != scaled {
        debug!(
            "Advertising interval {} x {} clamped to {}",
            base.interval, scale, interval
        );
    }

    AdvertisingParameters { interval, ..base }
}

/// Advertising state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AdvertisingState {
    /// Not advertising.
    #[default]
    Idle = 0,
    /// Advertising.
    Advertising = 1,
    /// A central connected; advertising is paused by the radio.
    Connected = 2,
}

impl AdvertisingState {
    fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Advertising,
            2 => Self::Connected,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for AdvertisingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Advertising => write!(f, "Advertising"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Payload and parameters of the last successful start.
#[derive(Debug, Clone)]
struct Session {
    payload: AdvertisingPayload,
    params: AdvertisingParameters,
}

/// Drives advertising on the radio stack.
pub struct AdvertisingController<R: RadioStack> {
    radio: Arc<R>,
    state: AtomicU8,
    /// Serialises start/restart. Radio callbacks never take it.
    session: Mutex<Option<Session>>,
}

impl<R: RadioStack> AdvertisingController<R> {
    /// Create an idle controller.
    pub fn new(radio: Arc<R>) -> Self {
        Self {
            radio,
            state: AtomicU8::new(AdvertisingState::Idle as u8),
            session: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> AdvertisingState {
        AdvertisingState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Check if advertising.
    pub fn is_advertising(&self) -> bool {
        self.state() == AdvertisingState::Advertising
    }

    /// Start advertising. Restarts cleanly if already advertising.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a central is connected; `AdvertiseFailed` with the
    /// radio's status code if the radio rejects the parameters or payload.
    pub fn start(&self, payload: AdvertisingPayload, params: AdvertisingParameters) -> Result<()> {
        let mut session = self.session.lock();

        match self.state() {
            AdvertisingState::Connected => {
                return Err(Error::InvalidState {
                    operation: "start_advertising",
                    state: "central connected".to_string(),
                });
            }
            AdvertisingState::Advertising => {
                debug!("Already advertising, restarting");
                if let Err(status) = self.radio.stop_advertising().check() {
                    warn!("Radio refused to stop advertising: status {}", status);
                }
                self.transition(AdvertisingState::Advertising, AdvertisingState::Idle);
            }
            AdvertisingState::Idle => {}
        }

        if let Err(status) = self.radio.set_advertising_parameters(&params).check() {
            error!("Failed to apply advertising parameters: status {}", status);
            return Err(Error::AdvertiseFailed { status });
        }

        // Set before advertising so a connection reported during the call wins.
        if !self.transition(AdvertisingState::Idle, AdvertisingState::Advertising) {
            return Err(Error::InvalidState {
                operation: "start_advertising",
                state: self.state().to_string(),
            });
        }

        if let Err(status) = self.radio.advertise(&payload).check() {
            error!("Failed to start advertising: status {}", status);
            self.transition(AdvertisingState::Advertising, AdvertisingState::Idle);
            return Err(Error::AdvertiseFailed { status });
        }

        info!(
            "Advertising started ({} bytes, interval {})",
            payload.len(),
            params.interval
        );
        *session = Some(Session { payload, params });

        Ok(())
    }

    /// Restart advertising with the last successful payload and parameters.
    pub fn restart(&self) -> Result<()> {
        let session = self.session.lock().clone();
        match session {
            Some(Session { payload, params }) => self.start(payload, params),
            None => Err(Error::InvalidState {
                operation: "restart_advertising",
                state: "never started".to_string(),
            }),
        }
    }

    /// Stop advertising. No-op if not advertising.
    pub fn stop(&self) -> Result<()> {
        if !self.transition(AdvertisingState::Advertising, AdvertisingState::Idle) {
            return Ok(());
        }

        if let Err(status) = self.radio.stop_advertising().check() {
            warn!("Radio refused to stop advertising: status {}", status);
        }
        info!("Advertising stopped");

        Ok(())
    }

    /// The radio paused advertising because a central connected.
    pub fn mark_connected(&self) {
        self.state
            .store(AdvertisingState::Connected as u8, Ordering::SeqCst);
    }

    /// The central went away; advertising stays off until restarted.
    pub fn mark_disconnected(&self) {
        self.transition(AdvertisingState::Connected, AdvertisingState::Idle);
    }

    /// Parameters of the last successful start.
    pub fn parameters(&self) -> Option<AdvertisingParameters> {
        self.session.lock().as_ref().map(|s| s.params)
    }

    /// Payload of the last successful start.
    pub fn payload(&self) -> Option<AdvertisingPayload> {
        self.session.lock().as_ref().map(|s| s.payload.clone())
    }

    fn transition(&self, from: AdvertisingState, to: AdvertisingState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
