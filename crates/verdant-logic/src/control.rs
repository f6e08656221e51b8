//! Setpoint tracking with hysteresis: the decision core every actuator shares.
//!
//! A controller owns up to two opposed channels: one that raises the governed
//! value (heating, humidifying, watering, CO2 injection) and one that lowers
//! it (cooling, dehumidifying, exhaust). The rules:
//!
//! - An idle channel switches on only once the value leaves `target ± tolerance`
//!   in its direction.
//! - A running channel switches off once the value is no longer outside the band
//!   on its side. Improving while still outside is not enough.
//! - The two channels are mutually exclusive. Enabling one disables the other
//!   in the same evaluation, in automated and manual mode alike.

use serde::{Deserialize, Serialize};

/// Clamp a manual setting into `[min, max]`. NaN becomes `min`.
pub fn clamp_setting(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Target value plus deadband.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoint {
    pub target: f32,
    pub tolerance: f32,
}

impl Setpoint {
    pub fn new(target: f32, tolerance: f32) -> Self {
        Self {
            target,
            tolerance: tolerance.abs(),
        }
    }

    pub fn lower(&self) -> f32 {
        self.target - self.tolerance
    }

    pub fn upper(&self) -> f32 {
        self.target + self.tolerance
    }

    /// `|value − target| ≤ tolerance`.
    pub fn contains(&self, value: f32) -> bool {
        (value - self.target).abs() <= self.tolerance
    }

    /// Distance outside the band (0 inside).
    pub fn excess(&self, value: f32) -> f32 {
        if value < self.lower() {
            self.lower() - value
        } else if value > self.upper() {
            value - self.upper()
        } else {
            0.0
        }
    }
}

/// Which side of the band a channel corrects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Raise,
    Lower,
}

/// The channels a controller physically has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub raise: bool,
    pub lower: bool,
}

impl ChannelSet {
    pub const BIPOLAR: Self = Self {
        raise: true,
        lower: true,
    };
    pub const RAISE_ONLY: Self = Self {
        raise: true,
        lower: false,
    };
    pub const LOWER_ONLY: Self = Self {
        raise: false,
        lower: true,
    };

    pub fn has(&self, dir: Direction) -> bool {
        match dir {
            Direction::Raise => self.raise,
            Direction::Lower => self.lower,
        }
    }
}

/// Current on/off state of both channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub raise: bool,
    pub lower: bool,
}

impl ChannelState {
    pub fn get(&self, dir: Direction) -> bool {
        match dir {
            Direction::Raise => self.raise,
            Direction::Lower => self.lower,
        }
    }

    pub fn any(&self) -> bool {
        self.raise || self.lower
    }
}

/// What happened to one channel during an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Edge {
    #[default]
    Unchanged,
    Activated,
    Deactivated,
}

impl Edge {
    fn between(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => Edge::Activated,
            (true, false) => Edge::Deactivated,
            _ => Edge::Unchanged,
        }
    }
}

/// Per-channel edges produced by one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transitions {
    pub raise: Edge,
    pub lower: Edge,
}

impl Transitions {
    fn diff(before: ChannelState, after: ChannelState) -> Self {
        Self {
            raise: Edge::between(before.raise, after.raise),
            lower: Edge::between(before.lower, after.lower),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raise == Edge::Unchanged && self.lower == Edge::Unchanged
    }

    /// Number of idle → running edges.
    pub fn activations(&self) -> u32 {
        (self.raise == Edge::Activated) as u32 + (self.lower == Edge::Activated) as u32
    }

    /// Iterate `(direction, edge)` for edges that actually changed.
    pub fn changed(&self) -> impl Iterator<Item = (Direction, Edge)> {
        [(Direction::Raise, self.raise), (Direction::Lower, self.lower)]
            .into_iter()
            .filter(|(_, e)| *e != Edge::Unchanged)
    }
}

/// Hysteresis controller over a setpoint and a channel set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HysteresisController {
    pub setpoint: Setpoint,
    channels: ChannelSet,
    state: ChannelState,
}

impl HysteresisController {
    pub fn new(setpoint: Setpoint, channels: ChannelSet) -> Self {
        Self {
            setpoint,
            channels,
            state: ChannelState::default(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    /// Swap the physical channel set. Channels that no longer exist switch off.
    pub fn set_channels(&mut self, channels: ChannelSet) -> Transitions {
        let before = self.state;
        self.channels = channels;
        self.state.raise &= channels.raise;
        self.state.lower &= channels.lower;
        Transitions::diff(before, self.state)
    }

    /// Automated evaluation against a measured value.
    pub fn evaluate(&mut self, value: f32) -> Transitions {
        let before = self.state;
        let mut next = before;

        let below = value < self.setpoint.lower();
        let above = value > self.setpoint.upper();

        // Running channels stop once their side of the band is satisfied.
        if next.raise && !below {
            next.raise = false;
        }
        if next.lower && !above {
            next.lower = false;
        }

        if below && self.channels.raise {
            next.raise = true;
            next.lower = false;
        } else if above && self.channels.lower {
            next.lower = true;
            next.raise = false;
        }

        self.state = next;
        Transitions::diff(before, next)
    }

    /// Manual toggle. Exclusion still applies; no target seeking.
    pub fn set_manual(&mut self, dir: Direction, on: bool) -> Transitions {
        let before = self.state;
        let mut next = before;
        if self.channels.has(dir) {
            match (dir, on) {
                (Direction::Raise, true) => {
                    next.raise = true;
                    next.lower = false;
                }
                (Direction::Lower, true) => {
                    next.lower = true;
                    next.raise = false;
                }
                (Direction::Raise, false) => next.raise = false,
                (Direction::Lower, false) => next.lower = false,
            }
        }
        self.state = next;
        Transitions::diff(before, next)
    }

    /// Switch everything off.
    pub fn release(&mut self) -> Transitions {
        let before = self.state;
        self.state = ChannelState::default();
        Transitions::diff(before, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heater_cooler() -> HysteresisController {
        HysteresisController::new(Setpoint::new(23.0, 1.0), ChannelSet::BIPOLAR)
    }

    #[test]
    fn test_no_chatter_inside_band() {
        let mut c = heater_cooler();
        for i in 0..200 {
            let v = 23.0 + ((i as f32) * 0.37).sin() * 0.99;
            let t = c.evaluate(v);
            assert!(t.is_empty(), "flags changed at {v}");
            assert!(!c.state().any());
        }
    }

    #[test]
    fn test_activates_below_band_and_holds_until_reentry() {
        let mut c = heater_cooler();
        let t = c.evaluate(21.0);
        assert_eq!(t.raise, Edge::Activated);
        assert!(c.state().raise);

        // Improving but still outside: stays on.
        c.evaluate(21.5);
        c.evaluate(21.99);
        assert!(c.state().raise);

        // Back inside the band: off.
        let t = c.evaluate(22.0);
        assert_eq!(t.raise, Edge::Deactivated);
        assert!(!c.state().raise);
    }

    #[test]
    fn test_cooling_symmetric() {
        let mut c = heater_cooler();
        c.evaluate(25.0);
        assert!(c.state().lower);
        assert!(!c.state().raise);
        c.evaluate(24.5);
        assert!(c.state().lower);
        c.evaluate(24.0);
        assert!(!c.state().lower);
    }

    #[test]
    fn test_mutual_exclusion_on_overshoot() {
        let mut c = heater_cooler();
        c.evaluate(20.0);
        assert!(c.state().raise);
        let t = c.evaluate(26.0);
        assert_eq!(t.raise, Edge::Deactivated);
        assert_eq!(t.lower, Edge::Activated);
        assert!(!c.state().raise && c.state().lower);
    }

    #[test]
    fn test_manual_exclusion() {
        let mut c = heater_cooler();
        c.set_manual(Direction::Raise, true);
        assert!(c.state().raise);
        c.set_manual(Direction::Lower, true);
        assert!(c.state().lower);
        assert!(!c.state().raise);
    }

    #[test]
    fn test_missing_channel_ignored() {
        let mut c = HysteresisController::new(Setpoint::new(60.0, 5.0), ChannelSet::RAISE_ONLY);
        let t = c.evaluate(90.0);
        assert!(t.is_empty());
        assert!(!c.state().any());
        let t = c.set_manual(Direction::Lower, true);
        assert!(t.is_empty());
    }

    #[test]
    fn test_nan_measurement_releases() {
        let mut c = heater_cooler();
        c.evaluate(10.0);
        c.evaluate(f32::NAN);
        assert!(!c.state().any());
    }

    #[test]
    fn test_clamp_setting() {
        assert_eq!(clamp_setting(50.0, 15.0, 35.0), 35.0);
        assert_eq!(clamp_setting(f32::NAN, 15.0, 35.0), 15.0);
        assert_eq!(clamp_setting(20.0, 15.0, 35.0), 20.0);
    }

    #[test]
    fn test_setpoint_excess() {
        let sp = Setpoint::new(23.0, 1.0);
        assert_eq!(sp.excess(23.5), 0.0);
        assert!((sp.excess(20.0) - 2.0).abs() < 1e-6);
        assert!((sp.excess(25.5) - 1.5).abs() < 1e-6);
        assert!(sp.contains(22.0));
        assert!(!sp.contains(21.9));
    }

    #[test]
    fn test_removed_channel_switches_off() {
        let mut c = heater_cooler();
        c.evaluate(30.0);
        let t = c.set_channels(ChannelSet::RAISE_ONLY);
        assert_eq!(t.lower, Edge::Deactivated);
        assert!(c.evaluate(30.0).is_empty());
    }

    #[test]
    fn test_release_reports_edges() {
        let mut c = heater_cooler();
        c.evaluate(18.0);
        let t = c.release();
        assert_eq!(t.raise, Edge::Deactivated);
        assert_eq!(t.activations(), 0);
    }
}
