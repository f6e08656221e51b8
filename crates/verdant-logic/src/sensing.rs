//! Sensor reading stages and alert state, free of randomness.
//!
//! The random draws are made by the caller (`verdant-core` owns the RNG) and
//! passed in as unit values in `[-1, 1]`, so every stage here is a pure
//! function and testable on its own. Stage order:
//!
//! 1. extraction ([`SensorType::extract`])
//! 2. calibration ([`Calibration::apply`])
//! 3. noise ([`apply_noise`])
//! 4. accuracy degradation ([`apply_accuracy`])
//! 5. clamping ([`clamp_to_bounds`])

use serde::{Deserialize, Serialize};

use crate::environment::{EnvField, EnvironmentSnapshot};
use crate::ids::SensorId;

// ============================================================================
// SENSOR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    Temperature,
    Humidity,
    Light,
    Co2,
    Airflow,
}

impl SensorType {
    pub const ALL: [SensorType; 5] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Light,
        SensorType::Co2,
        SensorType::Airflow,
    ];

    pub fn field(&self) -> EnvField {
        match self {
            SensorType::Temperature => EnvField::Temperature,
            SensorType::Humidity => EnvField::Humidity,
            SensorType::Light => EnvField::Light,
            SensorType::Co2 => EnvField::Co2,
            SensorType::Airflow => EnvField::Airflow,
        }
    }

    /// Hard physical range the sensor may report.
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            SensorType::Temperature => (-40.0, 85.0),
            SensorType::Humidity => (0.0, 100.0),
            SensorType::Light => (0.0, 2500.0),
            SensorType::Co2 => (0.0, 5000.0),
            SensorType::Airflow => (0.0, 20.0),
        }
    }

    /// Smallest change worth a reading-changed notification.
    pub fn significance(&self) -> f32 {
        match self {
            SensorType::Temperature => 0.1,
            SensorType::Humidity => 0.5,
            SensorType::Light => 5.0,
            SensorType::Co2 => 10.0,
            SensorType::Airflow => 0.05,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::Humidity => "%RH",
            SensorType::Light => "µmol/m²/s",
            SensorType::Co2 => "ppm",
            SensorType::Airflow => "m/s",
        }
    }

    pub fn extract(&self, env: &EnvironmentSnapshot) -> f32 {
        env.get(self.field())
    }

    /// Plant-comfort defaults for a grow room.
    pub fn default_thresholds(&self) -> AlertThresholds {
        match self {
            SensorType::Temperature => AlertThresholds::new(Band::new(18.0, 28.0), Band::new(10.0, 35.0)),
            SensorType::Humidity => AlertThresholds::new(Band::new(40.0, 75.0), Band::new(25.0, 90.0)),
            SensorType::Light => AlertThresholds::new(Band::new(0.0, 1500.0), Band::new(0.0, 2000.0)),
            SensorType::Co2 => AlertThresholds::new(Band::new(350.0, 1500.0), Band::new(300.0, 2500.0)),
            SensorType::Airflow => AlertThresholds::new(Band::new(0.0, 3.0), Band::new(0.0, 5.0)),
        }
    }
}

// ============================================================================
// STAGES
// ============================================================================

/// `(raw + offset) * multiplier`. Default is identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub offset: f32,
    pub multiplier: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset: 0.0,
            multiplier: 1.0,
        }
    }
}

impl Calibration {
    pub fn new(offset: f32, multiplier: f32) -> Self {
        Self { offset, multiplier }
    }

    pub fn apply(&self, raw: f32) -> f32 {
        (raw + self.offset) * self.multiplier
    }
}

/// Multiplicative jitter: `value × (1 + fraction × unit)`, `unit` in `[-1, 1]`.
pub fn apply_noise(value: f32, fraction: f32, unit: f32) -> f32 {
    value * (1.0 + fraction * unit.clamp(-1.0, 1.0))
}

/// Multiplicative accuracy factor `accuracy + jitter × unit`. Shifts the mean,
/// unlike noise which only widens the spread.
pub fn apply_accuracy(value: f32, accuracy: f32, jitter: f32, unit: f32) -> f32 {
    value * (accuracy + jitter * unit.clamp(-1.0, 1.0))
}

/// Force into `[min, max]`. NaN maps to `min`.
pub fn clamp_to_bounds(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Tunable instrument imperfection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    /// Bound on the jitter fraction, `[0, 0.5]`.
    pub noise_fraction: f32,
    /// Rated accuracy factor, `[0.5, 1.5]`; 1.0 is unbiased.
    pub accuracy: f32,
    /// Bound on the accuracy perturbation, `[0, 0.1]`.
    pub accuracy_jitter: f32,
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            noise_fraction: 0.01,
            accuracy: 1.0,
            accuracy_jitter: 0.005,
        }
    }
}

impl SensorProfile {
    /// A perfect instrument.
    pub const IDEAL: Self = Self {
        noise_fraction: 0.0,
        accuracy: 1.0,
        accuracy_jitter: 0.0,
    };

    pub fn new(noise_fraction: f32, accuracy: f32, accuracy_jitter: f32) -> Self {
        Self {
            noise_fraction: clamp_to_bounds(noise_fraction, 0.0, 0.5),
            accuracy: clamp_to_bounds(accuracy, 0.5, 1.5),
            accuracy_jitter: clamp_to_bounds(accuracy_jitter, 0.0, 0.1),
        }
    }

    /// Stages 2–5 with caller-supplied unit draws.
    pub fn process(
        &self,
        raw: f32,
        calibration: &Calibration,
        bounds: (f32, f32),
        noise_unit: f32,
        accuracy_unit: f32,
    ) -> f32 {
        let v = calibration.apply(raw);
        let v = apply_noise(v, self.noise_fraction, noise_unit);
        let v = apply_accuracy(v, self.accuracy, self.accuracy_jitter, accuracy_unit);
        clamp_to_bounds(v, bounds.0, bounds.1)
    }
}

/// One processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Ground truth as extracted.
    pub raw: f32,
    /// After calibration, noise, accuracy and clamping.
    pub value: f32,
    /// Simulated seconds since facility start.
    pub timestamp: f64,
}

/// True if `next` differs from the last published value by more than `threshold`.
pub fn is_significant(last_published: Option<f32>, next: f32, threshold: f32) -> bool {
    match last_published {
        None => true,
        Some(prev) => (next - prev).abs() > threshold,
    }
}

// ============================================================================
// ALERTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    #[default]
    Active,
    Warning,
    Critical,
}

impl From<Severity> for SensorStatus {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Warning => SensorStatus::Warning,
            Severity::Critical => SensorStatus::Critical,
        }
    }
}

/// Inclusive safe range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBand")]
pub struct Band {
    pub low: f32,
    pub high: f32,
}

#[derive(Deserialize)]
struct RawBand {
    low: f32,
    high: f32,
}

impl From<RawBand> for Band {
    fn from(raw: RawBand) -> Self {
        Self::new(raw.low, raw.high)
    }
}

impl Band {
    /// Swaps the ends if given in reverse.
    pub fn new(low: f32, high: f32) -> Self {
        if low <= high {
            Self { low, high }
        } else {
            Self {
                low: high,
                high: low,
            }
        }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Warning band nested inside the critical band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub warning: Band,
    pub critical: Band,
}

impl AlertThresholds {
    pub fn new(warning: Band, critical: Band) -> Self {
        Self { warning, critical }
    }

    /// Critical is checked first.
    pub fn classify(&self, value: f32) -> Option<(Severity, Band)> {
        if !self.critical.contains(value) {
            Some((Severity::Critical, self.critical))
        } else if !self.warning.contains(value) {
            Some((Severity::Warning, self.warning))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub sensor: SensorId,
    pub severity: Severity,
    pub reading: f32,
    /// The band that was left.
    pub violated: Band,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertOutcome {
    /// Nothing to report.
    Quiet,
    /// New or re-fired alert; publish it.
    Fired(Alert),
    /// Qualifying condition inside the cooldown; no re-fire, nothing cleared.
    /// With no alert in the slot the severity still shows in `status`.
    Suppressed,
    /// Reading back in the safe band; the previous alert is returned.
    Cleared(Alert),
}

/// One alert slot per sensor plus the shared cooldown timer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertTracker {
    active: Option<Alert>,
    last_fired: Option<f64>,
    /// Out-of-band condition seen inside the cooldown after the slot cleared.
    #[serde(default)]
    held: Option<Severity>,
}

impl AlertTracker {
    pub fn active(&self) -> Option<&Alert> {
        self.active.as_ref()
    }

    pub fn status(&self) -> SensorStatus {
        self.active
            .map(|a| a.severity)
            .or(self.held)
            .map(SensorStatus::from)
            .unwrap_or(SensorStatus::Active)
    }

    fn cooling_down(&self, now: f64, cooldown_secs: f32) -> bool {
        self.last_fired
            .is_some_and(|t| now - t < cooldown_secs as f64)
    }

    pub fn evaluate(
        &mut self,
        sensor: SensorId,
        value: f32,
        now: f64,
        thresholds: &AlertThresholds,
        cooldown_secs: f32,
    ) -> AlertOutcome {
        match thresholds.classify(value) {
            None => {
                self.held = None;
                match self.active.take() {
                    Some(prev) => AlertOutcome::Cleared(prev),
                    None => AlertOutcome::Quiet,
                }
            }
            Some((severity, _)) if self.cooling_down(now, cooldown_secs) => {
                if self.active.is_none() {
                    self.held = Some(severity);
                }
                AlertOutcome::Suppressed
            }
            Some((severity, violated)) => {
                let alert = Alert {
                    sensor,
                    severity,
                    reading: value,
                    violated,
                    timestamp: now,
                };
                self.active = Some(alert);
                self.held = None;
                self.last_fired = Some(now);
                AlertOutcome::Fired(alert)
            }
        }
    }

    pub fn clear(&mut self) -> Option<Alert> {
        self.held = None;
        self.active.take()
    }
}
