//! Integration tests across the logic modules.
//!
//! Exercises: Schedule → ControlledAxis → EnergyLedger, and the sensor
//! stages → AlertTracker → ReadingHistory chain.
//!
//! All tests are pure logic: no engine, no randomness beyond a seeded RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use verdant_logic::constants::climate;
use verdant_logic::control::{ChannelSet, Setpoint};
use verdant_logic::history::ReadingHistory;
use verdant_logic::ids::SensorId;
use verdant_logic::ledger::{total_power, EnergyLedger, PowerDraw};
use verdant_logic::rate::{active_rate, AxisDynamics, ControlledAxis};
use verdant_logic::schedule::{is_active, parameter_at, Schedule, ScheduleEntry};
use verdant_logic::sensing::{
    AlertOutcome, AlertTracker, Calibration, SensorProfile, SensorReading, SensorType,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn heater_axis(start: f32) -> ControlledAxis {
    let heat = active_rate(
        climate::DEFAULT_HEATING_KW,
        climate::DEFAULT_EFFICIENCY,
        climate::TEMP_RATE_PER_KW,
    );
    let cool = active_rate(
        climate::DEFAULT_COOLING_KW,
        climate::DEFAULT_EFFICIENCY,
        climate::TEMP_RATE_PER_KW,
    );
    ControlledAxis::new(
        start,
        Setpoint::new(23.0, 1.0),
        ChannelSet::BIPOLAR,
        AxisDynamics::linear(
            climate::TEMP_FLOOR,
            climate::TEMP_CEILING,
            climate::PASSIVE_DRIFT,
        ),
    )
    .with_rates(heat, cool)
}

// ── Schedule wraparound ────────────────────────────────────────────────

#[test]
fn overnight_window_active_across_midnight() {
    let schedule = Schedule {
        entries: vec![ScheduleEntry::new(22.0, 2.0, 4.0)],
    };
    assert!(is_active(23.5, Some(&schedule)));
    assert!(is_active(1.0, Some(&schedule)));
    assert!(!is_active(12.0, Some(&schedule)));
    assert_eq!(parameter_at(1.0, Some(&schedule)), 4.0);
    assert_eq!(parameter_at(12.0, Some(&schedule)), 0.0);
}

// ── Axis convergence ───────────────────────────────────────────────────

#[test]
fn heated_axis_converges_and_holds() {
    let mut axis = heater_axis(18.0);
    let ambient = 18.0;
    let mut entered = None;
    for tick in 0..200 {
        axis.decide();
        axis.step(60.0, ambient, 1.0);
        if entered.is_none() && axis.within_band() {
            entered = Some(tick);
        }
        if entered.is_some() {
            // Passive drift can dip slightly below before the heater re-arms.
            assert!(
                axis.current >= 21.9 && axis.current <= 24.0,
                "left band at tick {tick}: {}",
                axis.current
            );
        }
    }
    assert!(entered.is_some_and(|t| t < 20), "entered at {entered:?}");
}

#[test]
fn ledger_tracks_axis_power() {
    let mut axis = heater_axis(18.0);
    let mut ledger = EnergyLedger::default();
    let mut last = 0.0;
    for _ in 0..30 {
        let t = axis.decide();
        ledger.record_cycles(t.activations());
        axis.step(60.0, 18.0, 1.0);
        let state = axis.channels();
        let watts = total_power(
            climate::BASELINE_WATTS,
            &[
                PowerDraw::new(climate::DEFAULT_HEATING_KW * 1000.0, state.raise),
                PowerDraw::new(climate::DEFAULT_COOLING_KW * 1000.0, state.lower),
            ],
            true,
        );
        ledger.accumulate(watts, 60.0, true);
        assert!(ledger.energy_kwh >= last);
        last = ledger.energy_kwh;
    }
    assert!(ledger.cycles >= 1);
    assert!((ledger.operating_hours - 0.5).abs() < 1e-9);
}

// ── Sensor stages ──────────────────────────────────────────────────────

#[test]
fn processed_readings_always_within_hard_bounds() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let profile = SensorProfile::new(0.5, 1.5, 0.1);
    for sensor in SensorType::ALL {
        let (min, max) = sensor.bounds();
        for _ in 0..10_000 {
            let raw = match rng.gen_range(0..10) {
                0 => f32::NAN,
                1 => f32::INFINITY,
                2 => f32::NEG_INFINITY,
                3 => rng.gen_range(-1.0e9..1.0e9),
                _ => rng.gen_range(min - 100.0..max + 100.0),
            };
            let cal = Calibration::new(rng.gen_range(-50.0..50.0), rng.gen_range(-3.0..3.0));
            let v = profile.process(
                raw,
                &cal,
                sensor.bounds(),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
            );
            assert!(
                v >= min && v <= max,
                "{sensor:?} produced {v} from raw {raw}"
            );
        }
    }
}

#[test]
fn alert_fires_once_per_cooldown_and_history_bounded() {
    let thresholds = SensorType::Temperature.default_thresholds();
    let mut tracker = AlertTracker::default();
    let mut history = ReadingHistory::with_capacity(10);
    let mut fired = 0;
    for i in 0..120 {
        let t = i as f64;
        let value = 38.0;
        history.push(SensorReading {
            raw: value,
            value,
            timestamp: t,
        });
        if let AlertOutcome::Fired(_) = tracker.evaluate(SensorId(7), value, t, &thresholds, 60.0) {
            fired += 1;
        }
    }
    assert_eq!(fired, 2);
    assert_eq!(history.len(), 10);
    assert!((history.analytics().mean - 38.0).abs() < 1e-5);
}
