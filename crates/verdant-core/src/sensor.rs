//! Sensor pipeline - sampling, connectivity and transmission buffering
//!
//! A sensor is bound to one data source at registration time. Each sample
//! runs the pure stages from `verdant_logic::sensing` with random draws taken
//! from a stream seeded by (facility seed, sensor id, sample index), so a
//! replay from the same seed and the same deltas reproduces every value, and
//! a loaded save continues the stream where it left off.

use std::collections::VecDeque;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use verdant_logic::constants::cadence::{
    ALERT_COOLDOWN_SECS, CONNECTIVITY_INTERVAL_SECS, DROP_PROBABILITY, PACKETS_PER_TRANSMISSION,
    PACKET_QUEUE_CAPACITY, RECOVER_PROBABILITY, SAMPLE_INTERVAL_SECS,
};
use verdant_logic::constants::sensor::{
    MULTIPLIER_MAX, MULTIPLIER_MIN, QUEUE_CAPACITY_MAX, SAMPLE_INTERVAL_MIN,
};
use verdant_logic::control::clamp_setting;
use verdant_logic::environment::EnvironmentSnapshot;
use verdant_logic::history::{Analytics, ReadingHistory, DEFAULT_HISTORY_CAPACITY};
use verdant_logic::ids::{SensorId, SystemId};
use verdant_logic::rate::sanitize_dt;
use verdant_logic::sensing::{
    is_significant, Alert, AlertOutcome, AlertThresholds, AlertTracker, Calibration, SensorProfile,
    SensorReading, SensorStatus, SensorType,
};

use crate::events::{Notification, NotificationBus};

/// Where a sensor reads its ground truth from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorSource {
    /// The externally supplied ambient snapshot, untouched.
    Ambient,
    /// Ambient overlaid with every registered subsystem.
    Zone,
    /// Ambient overlaid with one subsystem only.
    System(SystemId),
}

// ============================================================================
// CONNECTIVITY
// ============================================================================

/// Online/offline flag that may flip on its own, slower cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    online: bool,
    pub interval_secs: f32,
    pub drop_probability: f32,
    pub recover_probability: f32,
    since_check: f32,
    checks: u64,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(CONNECTIVITY_INTERVAL_SECS, DROP_PROBABILITY, RECOVER_PROBABILITY)
    }
}

impl Connectivity {
    pub fn new(interval_secs: f32, drop_probability: f32, recover_probability: f32) -> Self {
        Self {
            online: true,
            interval_secs: interval_secs.max(0.0),
            drop_probability: clamp_setting(drop_probability, 0.0, 1.0),
            recover_probability: clamp_setting(recover_probability, 0.0, 1.0),
            since_check: 0.0,
            checks: 0,
        }
    }

    /// Never drops, never needs to recover.
    pub fn reliable() -> Self {
        Self::new(CONNECTIVITY_INTERVAL_SECS, 0.0, 1.0)
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn checks(&self) -> u64 {
        self.checks
    }

    /// Returns the new state when it flipped. `roll` draws a uniform `[0, 1)`
    /// value for the check with the given index.
    fn advance(&mut self, dt_secs: f32, roll: impl FnOnce(u64) -> f32) -> Option<bool> {
        self.since_check += dt_secs;
        if self.interval_secs <= 0.0 || self.since_check < self.interval_secs {
            return None;
        }
        self.since_check = 0.0;
        let draw = roll(self.checks);
        self.checks += 1;
        let chance = if self.online {
            self.drop_probability
        } else {
            self.recover_probability
        };
        if draw < chance {
            self.online = !self.online;
            Some(self.online)
        } else {
            None
        }
    }

    pub fn force(&mut self, online: bool) -> bool {
        let changed = self.online != online;
        self.online = online;
        changed
    }
}

// ============================================================================
// PACKET QUEUE
// ============================================================================

/// Readings waiting for simulated transmission. Overflow drops the oldest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketQueue {
    capacity: usize,
    packets: VecDeque<SensorReading>,
    sent: u64,
    dropped: u64,
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::with_capacity(PACKET_QUEUE_CAPACITY)
    }
}

impl PacketQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, QUEUE_CAPACITY_MAX);
        Self {
            capacity,
            packets: VecDeque::with_capacity(capacity),
            sent: 0,
            dropped: 0,
        }
    }

    /// Returns true if an older packet was dropped to make room.
    pub fn push(&mut self, reading: SensorReading) -> bool {
        let mut overflowed = false;
        while self.packets.len() >= self.capacity {
            self.packets.pop_front();
            self.dropped += 1;
            overflowed = true;
        }
        self.packets.push_back(reading);
        overflowed
    }

    /// Send up to `max` packets, oldest first.
    pub fn transmit(&mut self, max: usize) -> usize {
        let n = max.min(self.packets.len());
        self.packets.drain(..n);
        self.sent += n as u64;
        n
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// ============================================================================
// SENSOR
// ============================================================================

const SAMPLE_STREAM: u64 = 0x5EED_0001;
const LINK_STREAM: u64 = 0x5EED_0002;

fn stream_rng(seed: u64, sensor: SensorId, stream: u64, index: u64) -> StdRng {
    let key = seed
        ^ (sensor.0 as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ stream.wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ index.wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(key)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub name: String,
    kind: SensorType,
    pub source: SensorSource,
    /// Subsystem that takes this sensor's readings as its measured value.
    pub feeds: Option<SystemId>,
    profile: SensorProfile,
    calibration: Calibration,
    thresholds: AlertThresholds,
    alert_cooldown_secs: f32,
    sample_interval_secs: f32,
    since_sample: f32,
    seed: u64,
    samples_taken: u64,
    last_published: Option<f32>,
    history: ReadingHistory,
    alerts: AlertTracker,
    connectivity: Connectivity,
    packets: PacketQueue,
    packets_per_transmission: usize,
    #[serde(skip)]
    bus: NotificationBus,
}

impl Sensor {
    /// Default profile, calibration, thresholds and cadence for `kind`.
    pub fn new(name: impl Into<String>, kind: SensorType, source: SensorSource) -> Self {
        Self {
            id: SensorId(0),
            name: name.into(),
            kind,
            source,
            feeds: None,
            profile: SensorProfile::default(),
            calibration: Calibration::default(),
            thresholds: kind.default_thresholds(),
            alert_cooldown_secs: ALERT_COOLDOWN_SECS,
            sample_interval_secs: SAMPLE_INTERVAL_SECS,
            since_sample: 0.0,
            seed: 0,
            samples_taken: 0,
            last_published: None,
            history: ReadingHistory::with_capacity(DEFAULT_HISTORY_CAPACITY),
            alerts: AlertTracker::default(),
            connectivity: Connectivity::default(),
            packets: PacketQueue::default(),
            packets_per_transmission: PACKETS_PER_TRANSMISSION,
            bus: NotificationBus::default(),
        }
    }

    pub fn with_profile(mut self, profile: SensorProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ReadingHistory::with_capacity(capacity);
        self
    }

    pub fn with_queue(mut self, capacity: usize, packets_per_transmission: usize) -> Self {
        self.packets = PacketQueue::with_capacity(capacity);
        self.packets_per_transmission = packets_per_transmission.max(1);
        self
    }

    /// Called by the facility on registration.
    pub fn attach(&mut self, id: SensorId, seed: u64, bus: NotificationBus) {
        self.id = id;
        self.seed = seed;
        self.bus = bus;
    }

    pub(crate) fn rebind_bus(&mut self, bus: NotificationBus) {
        self.bus = bus;
    }

    // ── Accessors ─────────────────────────────────────────────────────

    pub fn kind(&self) -> SensorType {
        self.kind
    }

    pub fn profile(&self) -> SensorProfile {
        self.profile
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub fn alert_cooldown_secs(&self) -> f32 {
        self.alert_cooldown_secs
    }

    pub fn sample_interval_secs(&self) -> f32 {
        self.sample_interval_secs
    }

    pub fn history(&self) -> &ReadingHistory {
        &self.history
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.history.latest()
    }

    pub fn status(&self) -> SensorStatus {
        self.alerts.status()
    }

    pub fn active_alert(&self) -> Option<&Alert> {
        self.alerts.active()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn packets(&self) -> &PacketQueue {
        &self.packets
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    /// Recomputed over the history buffer on every call.
    pub fn analytics(&self) -> Analytics {
        self.history.analytics()
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn set_profile(&mut self, profile: SensorProfile) {
        self.profile = SensorProfile::new(
            profile.noise_fraction,
            profile.accuracy,
            profile.accuracy_jitter,
        );
    }

    /// Offset is limited to the width of the sensor's hard range.
    pub fn set_calibration(&mut self, offset: f32, multiplier: f32) {
        let (min, max) = self.kind.bounds();
        let span = max - min;
        self.calibration = Calibration::new(
            clamp_setting(offset, -span, span),
            clamp_setting(multiplier, MULTIPLIER_MIN, MULTIPLIER_MAX),
        );
    }

    pub fn set_thresholds(&mut self, thresholds: AlertThresholds) {
        self.thresholds = thresholds;
    }

    pub fn set_alert_cooldown(&mut self, secs: f32) {
        self.alert_cooldown_secs = clamp_setting(secs, 0.0, f32::MAX);
    }

    pub fn set_sample_interval(&mut self, secs: f32) {
        self.sample_interval_secs = clamp_setting(secs, SAMPLE_INTERVAL_MIN, f32::MAX);
    }

    /// Operator override of the link state.
    pub fn set_online(&mut self, online: bool) {
        if self.connectivity.force(online) {
            self.announce_link(online);
        }
    }

    // ── Pipeline ──────────────────────────────────────────────────────

    /// Advance timers; sample at most once when the interval has elapsed.
    pub fn advance(
        &mut self,
        dt_secs: f32,
        truth: &EnvironmentSnapshot,
        now: f64,
    ) -> Option<SensorReading> {
        let dt = sanitize_dt(dt_secs);

        let (seed, id) = (self.seed, self.id);
        let flipped = self.connectivity.advance(dt, |index| {
            stream_rng(seed, id, LINK_STREAM, index).gen::<f32>()
        });
        if let Some(online) = flipped {
            self.announce_link(online);
        }

        self.since_sample += dt;
        if self.since_sample < self.sample_interval_secs {
            return None;
        }
        self.since_sample = 0.0;
        Some(self.sample(truth, now))
    }

    /// Run every stage once against `truth`, record, buffer, and notify.
    pub fn sample(&mut self, truth: &EnvironmentSnapshot, now: f64) -> SensorReading {
        let mut rng = stream_rng(self.seed, self.id, SAMPLE_STREAM, self.samples_taken);
        let noise_unit: f32 = rng.gen_range(-1.0..=1.0);
        let accuracy_unit: f32 = rng.gen_range(-1.0..=1.0);
        self.samples_taken += 1;

        let raw = self.kind.extract(truth);
        let value = self.profile.process(
            raw,
            &self.calibration,
            self.kind.bounds(),
            noise_unit,
            accuracy_unit,
        );
        let reading = SensorReading {
            raw,
            value,
            timestamp: now,
        };

        self.history.push(reading);
        if self.packets.push(reading) {
            debug!("{} packet queue full, oldest dropped", self.name);
        }
        if self.connectivity.is_online() {
            self.packets.transmit(self.packets_per_transmission);
        }

        if is_significant(self.last_published, value, self.kind.significance()) {
            self.last_published = Some(value);
            self.bus.publish(Notification::ReadingChanged {
                sensor: self.id,
                reading,
            });
        }

        match self.alerts.evaluate(
            self.id,
            value,
            now,
            &self.thresholds,
            self.alert_cooldown_secs,
        ) {
            AlertOutcome::Fired(alert) => {
                warn!(
                    "{} {:?} alert: {:.2} {} outside [{}, {}]",
                    self.name,
                    alert.severity,
                    value,
                    self.kind.unit(),
                    alert.violated.low,
                    alert.violated.high
                );
                self.bus.publish(Notification::AlertRaised(alert));
            }
            AlertOutcome::Cleared(alert) => {
                info!("{} alert cleared at {:.2} {}", self.name, value, self.kind.unit());
                self.bus.publish(Notification::AlertCleared(alert));
            }
            AlertOutcome::Suppressed | AlertOutcome::Quiet => {}
        }

        reading
    }

    fn announce_link(&self, online: bool) {
        if online {
            info!("{} back online", self.name);
        } else {
            warn!("{} went offline", self.name);
        }
        self.bus.publish(Notification::ConnectivityChanged {
            sensor: self.id,
            online,
        });
    }

    /// Drop history, alert state and queued packets. Calibration is kept.
    pub fn reset(&mut self) {
        self.history.clear();
        if let Some(alert) = self.alerts.clear() {
            self.bus.publish(Notification::AlertCleared(alert));
        }
        self.alerts = AlertTracker::default();
        self.last_published = None;
        self.packets = PacketQueue::with_capacity(self.packets.capacity());
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            unit: self.kind.unit(),
            latest: self.latest().copied(),
            status: self.status(),
            online: self.is_online(),
            analytics: self.analytics(),
            active_alert: self.active_alert().copied(),
            samples_taken: self.samples_taken,
            packets_queued: self.packets.len(),
            packets_sent: self.packets.sent(),
            packets_dropped: self.packets.dropped(),
        }
    }
}

/// Read-only view of a sensor for presentation and other consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub id: SensorId,
    pub name: String,
    pub kind: SensorType,
    pub unit: &'static str,
    pub latest: Option<SensorReading>,
    pub status: SensorStatus,
    /// Offline readings are stale and should not be trusted.
    pub online: bool,
    pub analytics: Analytics,
    pub active_alert: Option<Alert>,
    pub samples_taken: u64,
    pub packets_queued: usize,
    pub packets_sent: u64,
    pub packets_dropped: u64,
}
