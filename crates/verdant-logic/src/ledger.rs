//! Energy and performance bookkeeping per subsystem.

use serde::{Deserialize, Serialize};

use crate::constants::cadence::SECONDS_PER_HOUR;
use crate::rate::sanitize_dt;

/// Cumulative counters. Energy and hours only grow until [`EnergyLedger::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyLedger {
    /// Cumulative energy (kWh).
    pub energy_kwh: f64,
    /// Cumulative operating hours.
    pub operating_hours: f64,
    /// Automated idle → running transitions.
    pub cycles: u64,
}

impl EnergyLedger {
    /// Book `power_w` held for `dt_secs`. Hours accrue only while operational.
    /// Negative or NaN inputs contribute nothing.
    pub fn accumulate(&mut self, power_w: f32, dt_secs: f32, operational: bool) {
        let dt_secs = sanitize_dt(dt_secs);
        if dt_secs == 0.0 {
            return;
        }
        let hours = dt_secs as f64 / SECONDS_PER_HOUR as f64;
        if power_w > 0.0 {
            self.energy_kwh += power_w as f64 * hours / 1000.0;
        }
        if operational {
            self.operating_hours += hours;
        }
    }

    /// Energy only, for loads that ran for part of a tick.
    pub fn add_energy(&mut self, power_w: f32, secs: f32) {
        self.accumulate(power_w, secs, false);
    }

    pub fn record_cycles(&mut self, count: u32) {
        self.cycles += count as u64;
    }

    /// Administrative reset. The only way counters go down.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One power contributor: a channel's rated wattage and whether it is running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerDraw {
    pub watts: f32,
    pub active: bool,
}

impl PowerDraw {
    pub fn new(watts: f32, active: bool) -> Self {
        Self { watts, active }
    }
}

/// Baseline plus every active channel. A stopped subsystem draws nothing.
pub fn total_power(baseline_w: f32, draws: &[PowerDraw], operational: bool) -> f32 {
    if !operational {
        return 0.0;
    }
    baseline_w.max(0.0)
        + draws
            .iter()
            .filter(|d| d.active)
            .map(|d| d.watts.max(0.0))
            .sum::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kwh_formula() {
        let mut l = EnergyLedger::default();
        l.accumulate(1000.0, 3600.0, true);
        assert!((l.energy_kwh - 1.0).abs() < 1e-9);
        assert!((l.operating_hours - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_not_operational_skips_hours() {
        let mut l = EnergyLedger::default();
        l.accumulate(0.0, 3600.0, false);
        assert_eq!(l.operating_hours, 0.0);
        assert_eq!(l.energy_kwh, 0.0);
    }

    #[test]
    fn test_negative_inputs_ignored() {
        let mut l = EnergyLedger::default();
        l.accumulate(500.0, 60.0, true);
        let before = l;
        l.accumulate(500.0, -60.0, true);
        l.accumulate(-500.0, 60.0, true);
        l.accumulate(500.0, f32::NAN, true);
        l.accumulate(500.0, f32::INFINITY, true);
        assert_eq!(l.energy_kwh, before.energy_kwh);
        assert!(l.operating_hours > before.operating_hours);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut l = EnergyLedger::default();
        l.accumulate(900.0, 120.0, true);
        l.record_cycles(3);
        l.reset();
        assert_eq!(l.energy_kwh, 0.0);
        assert_eq!(l.operating_hours, 0.0);
        assert_eq!(l.cycles, 0);
    }

    #[test]
    fn test_total_power() {
        let draws = [PowerDraw::new(300.0, true), PowerDraw::new(500.0, false)];
        assert_eq!(total_power(15.0, &draws, true), 315.0);
        assert_eq!(total_power(15.0, &draws, false), 0.0);
    }
}
