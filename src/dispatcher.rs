//! Inbound write dispatch.
//!
//! The radio stack hands every write on the RX characteristic to
//! [`InboundDataDispatcher::on_write`] from its event context. The dispatcher
//! logs the data, lights the indicator and arms a single pending effect that
//! the application loop expires later.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::ble::radio::PeerHandle;
use crate::events::PeripheralEvent;
use crate::indicator::{Indicator, Rgb};

const NO_DEADLINE: u64 = 0;

/// Spreads consecutive draw counters across the seed space.
const SEED_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

fn pack_color(color: Rgb) -> u32 {
    u32::from(color.r) << 16 | u32::from(color.g) << 8 | u32::from(color.b)
}

fn unpack_color(packed: u32) -> Rgb {
    Rgb::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
}

/// A single timed effect, armed by writes and expired by the loop.
///
/// The deadline is stored as milliseconds since `epoch`; zero means nothing is
/// armed. Arming overwrites any earlier deadline. Expiry clears it with a
/// compare-and-swap so a write landing mid-clear keeps its new deadline.
#[derive(Debug)]
pub struct PendingEffect {
    epoch: Instant,
    deadline_ms: AtomicU64,
}

impl PendingEffect {
    /// Create with nothing armed.
    pub fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            deadline_ms: AtomicU64::new(NO_DEADLINE),
        }
    }

    fn offset_ms(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Arm (or re-arm) the effect to fire at `deadline`.
    pub fn arm(&self, deadline: Instant) {
        let ms = self.offset_ms(deadline).max(1);
        self.deadline_ms.store(ms, Ordering::SeqCst);
    }

    /// The armed deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.deadline_ms.load(Ordering::SeqCst) {
            NO_DEADLINE => None,
            ms => Some(self.epoch + Duration::from_millis(ms)),
        }
    }

    /// Check if an effect is armed.
    pub fn is_armed(&self) -> bool {
        self.deadline_ms.load(Ordering::SeqCst) != NO_DEADLINE
    }

    /// Clear the effect if its deadline has passed at `now`.
    ///
    /// Returns `true` exactly once per armed deadline.
    pub fn take_expired(&self, now: Instant) -> bool {
        let deadline = self.deadline_ms.load(Ordering::SeqCst);
        if deadline == NO_DEADLINE || self.offset_ms(now) < deadline {
            return false;
        }

        self.deadline_ms
            .compare_exchange(deadline, NO_DEADLINE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Counters kept by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Number of writes received.
    pub writes: u64,
    /// Total bytes received.
    pub bytes: u64,
}

/// Handles writes on the RX characteristic.
///
/// Runs in radio event context, so it only touches atomics, the indicator and
/// the broadcast sender. Each colour comes from a generator seeded with the
/// base seed and a per-write draw counter.
pub struct InboundDataDispatcher<I: Indicator> {
    indicator: Arc<I>,
    duration: Duration,
    pending: PendingEffect,
    seed: u64,
    draws: AtomicU64,
    last_color: AtomicU32,
    writes: AtomicU64,
    bytes: AtomicU64,
    event_tx: broadcast::Sender<PeripheralEvent>,
}

impl<I: Indicator> InboundDataDispatcher<I> {
    /// Create a dispatcher whose indicator effect lasts `duration`.
    pub fn new(
        indicator: Arc<I>,
        duration: Duration,
        rng_seed: Option<u64>,
        event_tx: broadcast::Sender<PeripheralEvent>,
    ) -> Self {
        let seed = rng_seed.unwrap_or_else(rand::random);

        Self {
            indicator,
            duration,
            pending: PendingEffect::new(Instant::now()),
            seed,
            draws: AtomicU64::new(0),
            last_color: AtomicU32::new(pack_color(Rgb::OFF)),
            writes: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            event_tx,
        }
    }

    /// Handle a write received now.
    pub fn on_write(&self, data: &[u8], peer: PeerHandle) {
        self.on_write_at(data, peer, Instant::now());
    }

    /// Handle a write received at `now`.
    ///
    /// Never fails and never blocks; `data` is copied before returning.
    pub fn on_write_at(&self, data: &[u8], peer: PeerHandle, now: Instant) {
        let data = Bytes::copy_from_slice(data);

        info!("Data ({} bytes):", data.len());
        info!("{}", String::from_utf8_lossy(&data));

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);

        let color = self.next_color();
        self.last_color.store(pack_color(color), Ordering::SeqCst);

        if self.pending.is_armed() {
            debug!("Indicator already lit, extending to new deadline");
        }
        // Must precede the indicator update; `poll_expired_at` re-checks it
        // after releasing.
        self.pending.arm(now + self.duration);
        self.indicator.set_control(true);
        self.indicator.set_color(color);
        debug!("Indicator set to {} from {}", color, peer);

        let _ = self
            .event_tx
            .send(PeripheralEvent::DataReceived { peer, data });
    }

    /// Expire the pending effect if due at `now`, releasing the indicator.
    ///
    /// Returns `true` if the indicator was released during this call.
    pub fn poll_expired_at(&self, now: Instant) -> bool {
        if !self.pending.take_expired(now) {
            return false;
        }

        self.indicator.set_control(false);

        if self.pending.is_armed() {
            // A write landed during the release.
            self.indicator.set_control(true);
            self.indicator
                .set_color(unpack_color(self.last_color.load(Ordering::SeqCst)));
            debug!("Indicator re-armed while releasing, kept lit");
            return false;
        }

        debug!("Indicator released");
        let _ = self.event_tx.send(PeripheralEvent::IndicatorReset);

        true
    }

    fn next_color(&self) -> Rgb {
        let draw = self.draws.fetch_add(1, Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(self.seed ^ draw.wrapping_mul(SEED_STRIDE));
        Rgb::random(&mut rng)
    }

    /// The pending effect.
    pub fn pending(&self) -> &PendingEffect {
        &self.pending
    }

    /// Write counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            writes: self.writes.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingIndicator;
    use std::sync::atomic::AtomicBool;
    use std::sync::{OnceLock, Weak};

    const PEER: PeerHandle = PeerHandle(1);

    fn dispatcher() -> (
        InboundDataDispatcher<RecordingIndicator>,
        Arc<RecordingIndicator>,
        broadcast::Receiver<PeripheralEvent>,
    ) {
        let (tx, rx) = broadcast::channel(16);
        let indicator = Arc::new(RecordingIndicator::new());
        let dispatcher = InboundDataDispatcher::new(
            indicator.clone(),
            Duration::from_millis(3000),
            Some(1),
            tx,
        );
        (dispatcher, indicator, rx)
    }

    #[test]
    fn test_write_arms_effect_and_expires_once() {
        let (dispatcher, indicator, mut rx) = dispatcher();
        let t = Instant::now();

        dispatcher.on_write_at(b"hello", PEER, t);

        assert_eq!(dispatcher.stats(), DispatchStats { writes: 1, bytes: 5 });
        assert!(indicator.is_controlled());
        assert_eq!(indicator.colors().len(), 1);
        assert!(dispatcher.pending().is_armed());
        assert_eq!(
            rx.try_recv().unwrap(),
            PeripheralEvent::DataReceived {
                peer: PEER,
                data: Bytes::from_static(b"hello"),
            }
        );

        assert!(!dispatcher.poll_expired_at(t + Duration::from_millis(2999)));
        assert!(indicator.is_controlled());

        assert!(dispatcher.poll_expired_at(t + Duration::from_millis(3001)));
        assert!(!dispatcher.poll_expired_at(t + Duration::from_millis(3002)));
        assert!(!indicator.is_controlled());
        assert_eq!(indicator.releases(), 1);
        assert_eq!(rx.try_recv().unwrap(), PeripheralEvent::IndicatorReset);
    }

    #[test]
    fn test_second_write_extends_deadline() {
        let (dispatcher, indicator, _rx) = dispatcher();
        let t = Instant::now();

        dispatcher.on_write_at(b"one", PEER, t);
        dispatcher.on_write_at(b"two", PEER, t + Duration::from_millis(1000));

        assert!(!dispatcher.poll_expired_at(t + Duration::from_millis(3001)));
        assert!(dispatcher.poll_expired_at(t + Duration::from_millis(4001)));
        assert!(!dispatcher.poll_expired_at(t + Duration::from_millis(9000)));

        assert_eq!(indicator.releases(), 1);
        assert_eq!(indicator.colors().len(), 2);
    }

    #[test]
    fn test_empty_write_accepted() {
        let (dispatcher, _indicator, mut rx) = dispatcher();
        dispatcher.on_write(&[], PEER);

        assert_eq!(dispatcher.stats(), DispatchStats { writes: 1, bytes: 0 });
        match rx.try_recv().unwrap() {
            PeripheralEvent::DataReceived { data, .. } => assert!(data.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    /// Writes once from inside its first release, like a write landing
    /// between the expiry and the hardware update.
    struct InterruptedIndicator {
        inner: RecordingIndicator,
        dispatcher: OnceLock<Weak<InboundDataDispatcher<InterruptedIndicator>>>,
        write_at: Instant,
        wrote: AtomicBool,
    }

    impl Indicator for InterruptedIndicator {
        fn set_control(&self, enabled: bool) {
            self.inner.set_control(enabled);
            if !enabled && !self.wrote.swap(true, Ordering::SeqCst) {
                if let Some(dispatcher) = self.dispatcher.get().and_then(Weak::upgrade) {
                    dispatcher.on_write_at(b"again", PEER, self.write_at);
                }
            }
        }

        fn set_color(&self, color: Rgb) {
            self.inner.set_color(color);
        }
    }

    #[test]
    fn test_write_during_release_keeps_indicator_lit() {
        let (tx, mut rx) = broadcast::channel(16);
        let t = Instant::now();
        let indicator = Arc::new(InterruptedIndicator {
            inner: RecordingIndicator::new(),
            dispatcher: OnceLock::new(),
            write_at: t + Duration::from_millis(3001),
            wrote: AtomicBool::new(false),
        });
        let dispatcher = Arc::new(InboundDataDispatcher::new(
            indicator.clone(),
            Duration::from_millis(3000),
            Some(3),
            tx,
        ));
        let _ = indicator.dispatcher.set(Arc::downgrade(&dispatcher));

        dispatcher.on_write_at(b"first", PEER, t);
        let _ = rx.try_recv();

        assert!(!dispatcher.poll_expired_at(t + Duration::from_millis(3001)));
        assert!(dispatcher.pending().is_armed());
        assert!(indicator.inner.is_controlled());
        assert!(matches!(
            rx.try_recv().unwrap(),
            PeripheralEvent::DataReceived { .. }
        ));
        assert!(rx.try_recv().is_err());

        assert!(!dispatcher.poll_expired_at(t + Duration::from_millis(6000)));
        assert!(dispatcher.poll_expired_at(t + Duration::from_millis(6002)));
        assert!(!indicator.inner.is_controlled());
        assert_eq!(rx.try_recv().unwrap(), PeripheralEvent::IndicatorReset);
    }

    #[test]
    fn test_stale_expiry_loses_to_rearm() {
        let effect = PendingEffect::new(Instant::now());
        let t = Instant::now();
        effect.arm(t + Duration::from_millis(10));
        effect.arm(t + Duration::from_millis(5000));

        assert!(!effect.take_expired(t + Duration::from_millis(20)));
        assert!(effect.is_armed());
        assert!(effect.take_expired(t + Duration::from_millis(5001)));
    }

    #[test]
    fn test_seeded_colors_repeat() {
        let (a, a_indicator, _rx_a) = dispatcher();
        let (b, b_indicator, _rx_b) = dispatcher();
        for _ in 0..3 {
            a.on_write(b"x", PEER);
            b.on_write(b"x", PEER);
        }

        assert_eq!(a_indicator.colors(), b_indicator.colors());
        assert_ne!(a_indicator.colors()[0], a_indicator.colors()[1]);
    }

    #[test]
    fn test_no_expiry_without_write() {
        let (dispatcher, indicator, _rx) = dispatcher();
        assert!(!dispatcher.poll_expired_at(Instant::now() + Duration::from_secs(60)));
        assert_eq!(indicator.releases(), 0);
        assert!(dispatcher.pending().deadline().is_none());
    }
}
