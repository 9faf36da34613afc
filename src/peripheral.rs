//! Peripheral controller.
//!
//! Owns the characteristic registry, advertising controller, connection
//! tracker and write dispatcher, and wires them to the radio stack. The
//! outer program calls [`PeripheralController::setup`] once and then either
//! calls [`PeripheralController::poll`] from its own loop or lets
//! [`PeripheralController::start_loop`] drive it on a Tokio task.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::ble::advertising::{
    build_payload_with_limit, compute_parameters, AdvertisingController, AdvertisingPayload,
    AdvertisingState,
};
use crate::ble::characteristics::{
    Characteristic, CharacteristicHandle, CharacteristicProperties, CharacteristicRegistry,
    ServiceDescriptor,
};
use crate::ble::connection::{ConnectionState, ConnectionStateTracker};
use crate::ble::radio::{AdvertisingParameters, LinkEvent, PeerHandle, RadioStack};
use crate::config::PeripheralConfig;
use crate::dispatcher::{DispatchStats, InboundDataDispatcher};
use crate::error::{Error, Result};
use crate::events::PeripheralEvent;
use crate::indicator::Indicator;

/// Delay before retrying a failed re-advertise.
const READVERTISE_RETRY: Duration = Duration::from_secs(1);

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// What a single [`PeripheralController::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    /// The pending indicator effect expired and the indicator was released.
    pub indicator_reset: bool,
    /// A status line was logged.
    pub status_reported: bool,
    /// Advertising was resumed after a disconnect.
    pub readvertised: bool,
}

/// A BLE peripheral exposing one service with an RX and a TX characteristic.
pub struct PeripheralController<R: RadioStack, I: Indicator> {
    radio: Arc<R>,
    config: PeripheralConfig,
    service: ServiceDescriptor,
    registry: Mutex<CharacteristicRegistry>,
    advertising: Arc<AdvertisingController<R>>,
    connection: Arc<ConnectionStateTracker>,
    dispatcher: Arc<InboundDataDispatcher<I>>,
    event_tx: broadcast::Sender<PeripheralEvent>,
    /// Reference point for the elapsed-time gates below.
    epoch: Instant,
    last_status_ms: AtomicU64,
    next_readvertise_ms: AtomicU64,
    /// Advertising was started and not explicitly stopped since.
    advertising_wanted: AtomicBool,
    callback_counter: AtomicU64,
    loop_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
    is_running: Arc<AtomicBool>,
}

impl<R, I> PeripheralController<R, I>
where
    R: RadioStack + 'static,
    I: Indicator + 'static,
{
    /// Create a controller. Nothing touches the radio until [`setup`](Self::setup).
    pub fn new(radio: Arc<R>, indicator: Arc<I>, config: PeripheralConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        let registry = CharacteristicRegistry::new(radio.max_characteristics());
        let advertising = Arc::new(AdvertisingController::new(radio.clone()));
        let connection = Arc::new(ConnectionStateTracker::new(event_tx.clone()));
        let dispatcher = Arc::new(InboundDataDispatcher::new(
            indicator,
            config.indicator_duration,
            config.rng_seed,
            event_tx.clone(),
        ));

        let service = ServiceDescriptor::new(config.service_uuid, config.device_name.clone());

        Self {
            radio,
            config,
            service,
            registry: Mutex::new(registry),
            advertising,
            connection,
            dispatcher,
            event_tx,
            epoch: Instant::now(),
            last_status_ms: AtomicU64::new(0),
            next_readvertise_ms: AtomicU64::new(0),
            advertising_wanted: AtomicBool::new(false),
            callback_counter: AtomicU64::new(0),
            loop_handle: RwLock::new(None),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One-time initialisation: power the radio, register the TX and RX
    /// characteristics, and start advertising with the scaled interval.
    ///
    /// # Errors
    ///
    /// Registration and payload errors are fatal. `AdvertiseFailed` leaves the
    /// characteristics registered; the caller may retry with
    /// [`start_advertising`](Self::start_advertising).
    pub fn setup(&self) -> Result<()> {
        if self.registry.lock().is_sealed() {
            return Err(Error::InvalidState {
                operation: "setup",
                state: "already set up".to_string(),
            });
        }

        info!("Starting BLE peripheral");
        self.radio.set_enabled(true);
        debug!("Service '{}' ({})", self.service.name, self.service.uuid);

        let tx = Characteristic::new(
            "tx",
            CharacteristicProperties::NOTIFY,
            self.config.tx_uuid,
            self.service.uuid,
        );

        let dispatcher = self.dispatcher.clone();
        let rx = Characteristic::new(
            "rx",
            CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
            self.config.rx_uuid,
            self.service.uuid,
        )
        .with_write_handler(Arc::new(move |data: &[u8], peer: PeerHandle| {
            dispatcher.on_write(data, peer)
        }));

        self.register_characteristic(tx)?;
        self.register_characteristic(rx)?;
        self.subscribe_link_events();

        let payload = build_payload_with_limit(
            &self.service.uuid,
            &self.config.device_name,
            self.config.payload_limit,
        )?;
        info!("Advertising data length: {}", payload.len());

        let params = compute_parameters(
            self.radio.advertising_parameters(),
            self.config.interval_scale,
        );
        info!("Advertising interval: {}", params.interval);

        self.registry.lock().seal();
        self.start_advertising(payload, params)?;

        info!("BLE peripheral started");
        Ok(())
    }

    /// Register an additional characteristic. Only allowed before advertising.
    pub fn register_characteristic(
        &self,
        characteristic: Characteristic,
    ) -> Result<CharacteristicHandle> {
        let mut registry = self.registry.lock();
        let handle = registry.register(characteristic.clone())?;

        if let Err(status) = self.radio.add_characteristic(&characteristic).check() {
            registry.rollback(handle);
            return Err(Error::Radio {
                operation: "add_characteristic",
                status,
            });
        }

        Ok(handle)
    }

    fn subscribe_link_events(&self) {
        let advertising = self.advertising.clone();
        let connection = self.connection.clone();

        self.radio
            .subscribe_link_events(Arc::new(move |event: LinkEvent| match event {
                LinkEvent::Connected(peer) => {
                    advertising.mark_connected();
                    connection.on_connect(peer);
                }
                LinkEvent::Disconnected(peer) => {
                    if connection.on_disconnect(peer) {
                        advertising.mark_disconnected();
                    }
                }
            }));
    }

    /// Start (or cleanly restart) advertising.
    pub fn start_advertising(
        &self,
        payload: AdvertisingPayload,
        params: AdvertisingParameters,
    ) -> Result<()> {
        self.advertising.start(payload, params)?;
        self.advertising_wanted.store(true, Ordering::SeqCst);
        let _ = self.event_tx.send(PeripheralEvent::AdvertisingStarted);
        Ok(())
    }

    /// Stop advertising and suppress re-advertising on disconnect.
    pub fn stop_advertising(&self) -> Result<()> {
        self.advertising_wanted.store(false, Ordering::SeqCst);
        let was_advertising = self.advertising.is_advertising();
        self.advertising.stop()?;
        if was_advertising {
            let _ = self.event_tx.send(PeripheralEvent::AdvertisingStopped);
        }
        Ok(())
    }

    /// Run one non-blocking iteration of the application loop.
    pub fn poll(&self) -> PollOutcome {
        self.poll_at(Instant::now())
    }

    /// Run one loop iteration as of `now`.
    pub fn poll_at(&self, now: Instant) -> PollOutcome {
        PollOutcome {
            indicator_reset: self.dispatcher.poll_expired_at(now),
            status_reported: self.report_status_at(now),
            readvertised: self.readvertise_at(now),
        }
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }

    fn report_status_at(&self, now: Instant) -> bool {
        let elapsed = self.elapsed_ms(now);
        let last = self.last_status_ms.load(Ordering::SeqCst);
        if elapsed.saturating_sub(last) < self.config.status_interval.as_millis() as u64 {
            return false;
        }
        self.last_status_ms.store(elapsed, Ordering::SeqCst);

        let (state, peer) = self.connection.snapshot();
        let stats = self.dispatcher.stats();
        info!(
            "BLE status: {} (peer: {:?}, advertising: {}, writes: {}, bytes: {})",
            state,
            peer,
            self.advertising.state(),
            stats.writes,
            stats.bytes
        );

        let radio_connected = self.radio.is_connected();
        if radio_connected != state.is_connected() {
            debug!(
                "Radio reports connected={} while tracker reports {}",
                radio_connected, state
            );
        }

        true
    }

    fn readvertise_at(&self, now: Instant) -> bool {
        if !self.config.readvertise_on_disconnect
            || !self.advertising_wanted.load(Ordering::SeqCst)
            || self.advertising.state() != AdvertisingState::Idle
            || self.connection.is_connected()
        {
            return false;
        }

        let elapsed = self.elapsed_ms(now);
        if elapsed < self.next_readvertise_ms.load(Ordering::SeqCst) {
            return false;
        }

        match self.advertising.restart() {
            Ok(()) => {
                info!("Advertising resumed after disconnect");
                let _ = self.event_tx.send(PeripheralEvent::AdvertisingStarted);
                true
            }
            Err(e) => {
                warn!("Failed to resume advertising: {}", e);
                self.next_readvertise_ms.store(
                    elapsed + READVERTISE_RETRY.as_millis() as u64,
                    Ordering::SeqCst,
                );
                false
            }
        }
    }

    /// Send a notification on the TX characteristic.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a central, `InvalidParameter` if `data` exceeds
    /// the configured notification size, `Radio` if the stack rejects it.
    pub fn notify(&self, data: &[u8]) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(Error::NotConnected);
        }

        if data.len() > self.config.max_notify_len {
            return Err(Error::InvalidParameter {
                name: "data.len".to_string(),
                value: data.len().to_string(),
            });
        }

        self.radio
            .notify(self.config.tx_uuid, data)
            .check()
            .map_err(|status| Error::Radio {
                operation: "notify",
                status,
            })?;

        trace!("Notified {} bytes", data.len());
        Ok(())
    }

    /// Start the background loop on the current Tokio runtime.
    ///
    /// The task only holds a weak reference, so dropping the last controller
    /// handle also ends it.
    pub async fn start_loop(self: &Arc<Self>) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Loop already running");
            return Ok(());
        }

        info!("Starting peripheral loop");

        let controller: Weak<Self> = Arc::downgrade(self);
        let is_running = self.is_running.clone();
        let period = self.config.poll_period;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while is_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                match controller.upgrade() {
                    Some(controller) => {
                        controller.poll();
                    }
                    None => break,
                }
            }

            debug!("Peripheral loop ended");
        });

        *self.loop_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop the background loop and wait for it to finish.
    pub async fn stop_loop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping peripheral loop");

        let handle = self.loop_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Check if the background loop is running.
    pub fn is_loop_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop the loop and advertising, then power the radio down.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down peripheral");

        self.stop_loop().await;
        self.stop_advertising()?;
        self.radio.set_enabled(false);

        Ok(())
    }

    /// Subscribe to peripheral events.
    pub fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for peripheral events.
    ///
    /// The callback runs on a Tokio task, never in radio event context.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(PeripheralEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event callback lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Check if a central is connected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Get the connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Check if advertising.
    pub fn is_advertising(&self) -> bool {
        self.advertising.is_advertising()
    }

    /// Get the advertising state.
    pub fn advertising_state(&self) -> AdvertisingState {
        self.advertising.state()
    }

    /// Payload of the current advertising session.
    pub fn advertising_payload(&self) -> Option<AdvertisingPayload> {
        self.advertising.payload()
    }

    /// Parameters of the current advertising session.
    pub fn advertising_parameters(&self) -> Option<AdvertisingParameters> {
        self.advertising.parameters()
    }

    /// Write counters.
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Check if the indicator effect is pending.
    pub fn is_indicator_active(&self) -> bool {
        self.dispatcher.pending().is_armed()
    }

    /// Number of registered characteristics.
    pub fn characteristic_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// The service this peripheral exposes.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// The configuration in use.
    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }
}

impl<R: RadioStack, I: Indicator> Drop for PeripheralController<R, I> {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::advertising::AdType;
    use crate::ble::radio::StatusCode;
    use crate::ble::uuids::{RX_UUID, SERVICE_UUID, TX_UUID};
    use crate::sim::{RecordingIndicator, SimulatedRadio};
    use tokio_test::{assert_err, assert_ok};

    const PEER: PeerHandle = PeerHandle(1);

    type TestController = PeripheralController<SimulatedRadio, RecordingIndicator>;

    fn controller_with(
        config: PeripheralConfig,
        capacity: usize,
    ) -> (TestController, Arc<SimulatedRadio>, Arc<RecordingIndicator>) {
        let radio = Arc::new(SimulatedRadio::new(capacity));
        let indicator = Arc::new(RecordingIndicator::new());
        let controller =
            PeripheralController::new(radio.clone(), indicator.clone(), config.with_rng_seed(9));
        (controller, radio, indicator)
    }

    fn controller() -> (TestController, Arc<SimulatedRadio>, Arc<RecordingIndicator>) {
        controller_with(PeripheralConfig::default(), 8)
    }

    #[test]
    fn test_setup_advertises_partible() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());

        assert!(radio.is_enabled());
        assert!(controller.is_advertising());
        assert!(radio.is_advertising());

        let payload = controller.advertising_payload().unwrap();
        assert_eq!(payload.len(), 28);
        assert_eq!(payload.fields()[0].ad_type, AdType::COMPLETE_128_SERVICE_LIST);
        assert_eq!(payload.local_name().as_deref(), Some("partible"));
        assert_eq!(radio.payload(), Some(payload));

        // Radio default 160 scaled by 4.
        assert_eq!(controller.advertising_parameters().unwrap().interval, 640);
        assert_eq!(radio.advertising_parameters().interval, 640);

        let chars = radio.characteristics();
        assert_eq!(chars.len(), 2);
        assert_eq!(chars[0].0, "tx");
        assert_eq!(chars[0].1, TX_UUID);
        assert_eq!(chars[0].2, CharacteristicProperties::NOTIFY);
        assert_eq!(chars[1].1, RX_UUID);
        assert_eq!(chars[1].2, CharacteristicProperties::WRITE_WITHOUT_RESPONSE);

        assert_eq!(
            controller.service(),
            &ServiceDescriptor::new(SERVICE_UUID, "partible")
        );
    }

    #[test]
    fn test_setup_twice_rejected() {
        let (controller, _, _) = controller();
        assert_ok!(controller.setup());
        assert!(matches!(
            controller.setup(),
            Err(Error::InvalidState { operation: "setup", .. })
        ));
    }

    #[test]
    fn test_register_after_setup_rejected() {
        let (controller, _, _) = controller();
        assert_ok!(controller.setup());

        let extra = Characteristic::new(
            "extra",
            CharacteristicProperties::READ,
            uuid::Uuid::from_u128(0x6e40_0004_b5a3_f393_e0a9_e50e24dcca9e),
            SERVICE_UUID,
        );
        assert!(matches!(
            controller.register_characteristic(extra),
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(controller.characteristic_count(), 2);
    }

    #[test]
    fn test_setup_capacity_exceeded() {
        let (controller, radio, _) = controller_with(PeripheralConfig::default(), 1);
        assert_eq!(
            controller.setup().unwrap_err(),
            Error::CapacityExceeded { max: 1 }
        );
        assert!(!radio.is_advertising());
    }

    #[test]
    fn test_setup_advertise_failure_is_recoverable() {
        let (controller, radio, _) = controller();
        radio.fail_next_advertise(StatusCode(-130));

        let err = controller.setup().unwrap_err();
        assert_eq!(
            err,
            Error::AdvertiseFailed {
                status: StatusCode(-130)
            }
        );
        assert!(err.is_recoverable());
        assert_eq!(controller.advertising_state(), AdvertisingState::Idle);

        // Not re-armed automatically: the outer program decides.
        assert!(!controller.poll().readvertised);
    }

    #[test]
    fn test_write_lights_indicator_then_resets_once() {
        let (controller, radio, indicator) = controller();
        assert_ok!(controller.setup());
        radio.connect(PEER);

        let before = Instant::now();
        assert!(radio.write(RX_UUID, b"hello", PEER));
        let after = Instant::now();

        assert_eq!(controller.stats(), DispatchStats { writes: 1, bytes: 5 });
        assert!(indicator.is_controlled());
        assert!(controller.is_indicator_active());

        assert!(!controller.poll_at(before).indicator_reset);
        assert!(controller.poll_at(after + Duration::from_millis(3001)).indicator_reset);
        assert!(!controller.poll_at(after + Duration::from_millis(3002)).indicator_reset);
        assert_eq!(indicator.releases(), 1);
        assert!(!controller.is_indicator_active());
    }

    #[test]
    fn test_connect_disconnect_readvertises() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());
        let mut events = controller.subscribe();

        radio.connect(PEER);
        assert!(controller.is_connected());
        assert_eq!(controller.advertising_state(), AdvertisingState::Connected);
        assert!(!controller.poll().readvertised);

        radio.disconnect(PEER);
        assert!(!controller.is_connected());
        assert_eq!(controller.advertising_state(), AdvertisingState::Idle);

        assert!(controller.poll().readvertised);
        assert!(controller.is_advertising());
        assert!(radio.is_advertising());
        assert_eq!(radio.advertise_calls(), 2);

        assert_eq!(events.try_recv().unwrap(), PeripheralEvent::Connected(PEER));
        assert_eq!(events.try_recv().unwrap(), PeripheralEvent::Disconnected(PEER));
        assert_eq!(events.try_recv().unwrap(), PeripheralEvent::AdvertisingStarted);
    }

    #[test]
    fn test_disconnect_for_unknown_peer_keeps_link() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());

        radio.connect(PEER);
        radio.emit_link_event(LinkEvent::Disconnected(PeerHandle(2)));

        assert!(controller.is_connected());
        assert_eq!(controller.advertising_state(), AdvertisingState::Connected);
        assert!(!controller.poll().readvertised);
        assert!(matches!(
            controller.start_advertising(
                controller.advertising_payload().unwrap(),
                controller.advertising_parameters().unwrap(),
            ),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_readvertise_disabled() {
        let (controller, radio, _) = controller_with(
            PeripheralConfig::default().with_readvertise_on_disconnect(false),
            8,
        );
        assert_ok!(controller.setup());

        radio.connect(PEER);
        radio.disconnect(PEER);

        assert!(!controller.poll().readvertised);
        assert_eq!(controller.advertising_state(), AdvertisingState::Idle);
        assert_eq!(radio.advertise_calls(), 1);
    }

    #[test]
    fn test_readvertise_retries_after_delay() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());

        radio.connect(PEER);
        radio.disconnect(PEER);
        radio.fail_next_advertise(StatusCode(-5));

        let now = Instant::now();
        assert!(!controller.poll_at(now).readvertised);
        assert!(!controller.poll_at(now + Duration::from_millis(500)).readvertised);
        assert!(controller.poll_at(now + Duration::from_millis(1100)).readvertised);
        assert!(controller.is_advertising());
    }

    #[test]
    fn test_stop_advertising_suppresses_readvertise() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());

        assert_ok!(controller.stop_advertising());
        assert!(!radio.is_advertising());
        assert!(!controller.poll().readvertised);
        // Stopping again is a no-op.
        assert_ok!(controller.stop_advertising());
    }

    #[test]
    fn test_status_report_gated_by_elapsed_time() {
        let (controller, _, _) = controller();
        let t0 = Instant::now();

        assert!(!controller.poll_at(t0).status_reported);
        assert!(controller.poll_at(t0 + Duration::from_secs(10)).status_reported);
        assert!(!controller.poll_at(t0 + Duration::from_secs(15)).status_reported);
        assert!(
            controller
                .poll_at(t0 + Duration::from_millis(20_001))
                .status_reported
        );
    }

    #[test]
    fn test_status_report_with_diverging_radio_state() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());
        let t0 = Instant::now();

        radio.connect(PEER);
        // The tracker hears a disconnect the radio never applied.
        radio.emit_link_event(LinkEvent::Disconnected(PEER));

        assert!(radio.is_connected());
        assert!(!controller.is_connected());
        assert!(controller.poll_at(t0 + Duration::from_secs(10)).status_reported);
    }

    #[test]
    fn test_notify() {
        let (controller, radio, _) = controller_with(
            PeripheralConfig::default().with_max_notify_len(4),
            8,
        );
        assert_ok!(controller.setup());

        assert_eq!(controller.notify(b"hi").unwrap_err(), Error::NotConnected);

        radio.connect(PEER);
        assert_ok!(controller.notify(b"hi"));
        assert_eq!(radio.notifications(), vec![(TX_UUID, b"hi".to_vec())]);

        assert_err!(controller.notify(b"too long"));
    }

    #[tokio::test]
    async fn test_background_loop_expires_effect() {
        let config = PeripheralConfig::default()
            .with_indicator_duration(Duration::from_millis(50))
            .with_poll_period(Duration::from_millis(5));
        let (controller, radio, indicator) = controller_with(config, 8);
        let controller = Arc::new(controller);
        assert_ok!(controller.setup());

        assert_ok!(controller.start_loop().await);
        assert!(controller.is_loop_running());

        radio.connect(PEER);
        assert!(radio.write(RX_UUID, b"ping", PEER));
        assert!(indicator.is_controlled());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!indicator.is_controlled());
        assert_eq!(indicator.releases(), 1);

        controller.stop_loop().await;
        assert!(!controller.is_loop_running());
    }

    #[tokio::test]
    async fn test_on_event_callback() {
        let (controller, radio, _) = controller();
        assert_ok!(controller.setup());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = controller.on_event(move |event| {
            let _ = tx.send(event);
        });

        radio.connect(PEER);
        assert!(radio.write(RX_UUID, b"abc", PEER));

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, PeripheralEvent::Connected(PEER));

        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, PeripheralEvent::DataReceived { .. }));

        handle.unregister();
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (controller, radio, _) = controller();
        let controller = Arc::new(controller);
        assert_ok!(controller.setup());
        assert_ok!(controller.start_loop().await);

        assert_ok!(controller.shutdown().await);
        assert!(!controller.is_loop_running());
        assert!(!controller.is_advertising());
        assert!(!radio.is_enabled());
    }
}
