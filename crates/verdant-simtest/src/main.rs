//! Verdant Headless Simulation Harness
//!
//! Replays a facility configuration and a set of scripted scenarios against
//! the engine. Runs entirely in-process: no host, no rendering, no I/O beyond
//! the optional config path.
//!
//! Usage:
//!   cargo run -p verdant-simtest
//!   cargo run -p verdant-simtest -- --verbose
//!   cargo run -p verdant-simtest -- --config path/to/facility.json --json

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use verdant_core::prelude::*;
use verdant_logic::constants::climate::PASSIVE_DRIFT;
use verdant_logic::rate::passive_drift;
use verdant_logic::schedule::{in_window, ScheduleEntry};

// ── Reference facility (same JSON the host ships with) ──────────────────
const FACILITY_JSON: &str = include_str!("../../../data/facility.json");

// ── Test harness ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

#[derive(Serialize)]
struct Report<'a> {
    passed: usize,
    failed: usize,
    results: &'a [TestResult],
}

fn check(name: &str, passed: bool, detail: String) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let json = args.iter().any(|a| a == "--json");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].clone());

    println!("=== Verdant Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Facility config validation
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => {
            results.extend(validate_config(&config, verbose));
            Some(config)
        }
        Err(detail) => {
            results.push(check("config_parse", false, detail));
            None
        }
    };

    // 2. Schedule window sweep
    results.extend(validate_schedules(verbose));

    // 3. Climate convergence
    results.extend(validate_climate(verbose));

    // 4. Irrigation volume and exhaustion
    results.extend(validate_irrigation(verbose));

    // 5. Sensor pipeline bounds and alerts
    results.extend(validate_sensors(verbose));

    // 6. Full-day replay of the configured facility
    if let Some(config) = &config {
        results.extend(validate_day(config, verbose));
    }

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if json {
        let report = Report {
            passed,
            failed,
            results: &results,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("report serialization failed: {}", e),
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<FacilityConfig, String> {
    match path {
        Some(path) => FacilityConfig::load(path).map_err(|e| e.to_string()),
        None => FacilityConfig::from_json_str(FACILITY_JSON).map_err(|e| e.to_string()),
    }
}

// ── 1. Facility Config ──────────────────────────────────────────────────

fn validate_config(config: &FacilityConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Facility Config ---");
    let mut results = Vec::new();

    results.push(check(
        "config_has_systems",
        config.system_count() > 0,
        format!(
            "{} systems, {} sensors",
            config.system_count(),
            config.sensors.len()
        ),
    ));

    let facility = Facility::from_config(config);
    let unbound: Vec<_> = config
        .sensors
        .iter()
        .filter(|sc| {
            let wanted = matches!(sc.source, SourceConfig::System(_));
            let bound = facility
                .find_sensor(&sc.name)
                .and_then(|id| facility.sensor(id))
                .is_some_and(|s| matches!(s.source, SensorSource::System(_)));
            wanted && !bound
        })
        .map(|sc| sc.name.clone())
        .collect();
    results.push(check(
        "config_sources_resolve",
        unbound.is_empty(),
        if unbound.is_empty() {
            "every system-bound sensor found its subsystem".into()
        } else {
            format!("unresolved: {:?}", unbound)
        },
    ));

    let dangling: Vec<_> = config
        .sensors
        .iter()
        .filter(|sc| sc.feeds.as_deref().is_some_and(|n| facility.find_system(n).is_none()))
        .map(|sc| sc.name.clone())
        .collect();
    results.push(check(
        "config_feeds_resolve",
        dangling.is_empty(),
        format!("{} dangling feed links", dangling.len()),
    ));

    let roundtrip = config
        .to_json()
        .ok()
        .and_then(|text| FacilityConfig::from_json_str(&text).ok());
    results.push(check(
        "config_json_roundtrip",
        roundtrip.as_ref() == Some(config),
        "config survives serialize/parse".into(),
    ));

    if verbose {
        for status in facility.status_all() {
            println!("    {} {:?} ({})", status.id, status.kind, status.name);
        }
    }
    results
}

// ── 2. Schedules ────────────────────────────────────────────────────────

fn validate_schedules(verbose: bool) -> Vec<TestResult> {
    println!("--- Schedules ---");
    let mut results = Vec::new();

    let overnight = ScheduleEntry::new(22.0, 2.0, 1.0);
    let cases = [(23.5, true), (1.0, true), (12.0, false), (22.0, true), (2.0, false)];
    let wrong: Vec<_> = cases
        .iter()
        .filter(|(hour, want)| overnight.contains(*hour) != *want)
        .collect();
    results.push(check(
        "schedule_wraparound",
        wrong.is_empty(),
        format!("22:00-02:00 checked at {} hours, {} wrong", cases.len(), wrong.len()),
    ));

    // Every minute of the day, an overnight window equals the union of its halves.
    let mismatches = (0..1440)
        .map(|m| m as f32 / 60.0)
        .filter(|&h| in_window(h, 22.0, 2.0) != (in_window(h, 22.0, 24.0) || in_window(h, 0.0, 2.0)))
        .count();
    results.push(check(
        "schedule_wrap_equals_split",
        mismatches == 0,
        format!("{} mismatched minutes", mismatches),
    ));

    let empty = in_window(12.0, 5.0, 5.0);
    results.push(check(
        "schedule_zero_length_inactive",
        !empty,
        "start == end never matches".into(),
    ));

    if verbose {
        println!("    swept 1440 minutes");
    }
    results
}

// ── 3. Climate ──────────────────────────────────────────────────────────

fn validate_climate(verbose: bool) -> Vec<TestResult> {
    println!("--- Climate ---");
    let mut results = Vec::new();

    let mut facility = Facility::new(1);
    let id = facility.add_system(ClimateSystem::new(
        &ClimateConfig {
            target_temperature: 23.0,
            temperature_tolerance: 1.0,
            heating_kw: 10.0,
            efficiency: 0.85,
            initial_temperature: Some(18.0),
            ..Default::default()
        },
        EnvironmentSnapshot::default(),
    ));
    facility.start_all();
    let temp = |f: &Facility| f.climate(id).map(|c| c.temperature()).unwrap_or(f32::NAN);

    let entered = (1..=60).find(|_| {
        facility.advance(60.0);
        (22.0..=24.0).contains(&temp(&facility))
    });
    results.push(check(
        "climate_converges",
        entered.is_some(),
        match entered {
            Some(ticks) => format!("18 -> band in {} ticks of 60 s", ticks),
            None => format!("stuck at {:.2} °C", temp(&facility)),
        },
    ));

    let mut low = f32::MAX;
    let mut high = f32::MIN;
    for _ in 0..240 {
        facility.advance(60.0);
        low = low.min(temp(&facility));
        high = high.max(temp(&facility));
    }
    // One tick of passive drift past the lower edge before the heater reacts.
    let ambient = EnvironmentSnapshot::default().temperature;
    let undershoot = 22.0 - passive_drift(22.0, ambient, PASSIVE_DRIFT, 60.0) + 1e-4;
    results.push(check(
        "climate_holds_band",
        low >= 22.0 - undershoot && high <= 24.0,
        format!("held {:.2}..{:.2} °C over 4 h", low, high),
    ));

    let status = facility.status(id);
    let exclusive = status.as_ref().is_some_and(|s| {
        let on = |ch| s.channel(ch).is_some_and(|c| c.active);
        !(on(Channel::Heating) && on(Channel::Cooling))
    });
    results.push(check(
        "climate_mutual_exclusion",
        exclusive,
        "heating and cooling never both on".into(),
    ));

    if verbose {
        if let Some(s) = status {
            println!("    cycles {} energy {:.2} kWh", s.cycles, s.energy_kwh);
        }
    }
    results
}

// ── 4. Irrigation ───────────────────────────────────────────────────────

fn validate_irrigation(verbose: bool) -> Vec<TestResult> {
    println!("--- Irrigation ---");
    let mut results = Vec::new();

    let mut facility = Facility::new(1);
    let id = facility.add_system(IrrigationSystem::new(
        &IrrigationConfig::default(),
        EnvironmentSnapshot::default(),
    ));
    facility.start_all();
    let pulses = Rc::new(RefCell::new(0u32));
    let counter = Rc::clone(&pulses);
    facility.bus().subscribe(move |n| {
        if let Notification::IrrigationPulse { count, .. } = n {
            *counter.borrow_mut() += count;
        }
    });

    let started = facility
        .irrigation_mut(id)
        .is_some_and(|s| s.start_run(Some(300.0)));
    for _ in 0..300 {
        facility.advance(1.0);
    }
    let used = facility
        .irrigation(id)
        .map(|s| s.tank_capacity() - s.tank_litres())
        .unwrap_or(0.0);
    results.push(check(
        "irrigation_exact_volume",
        started && (used - 50.0).abs() < 1e-2,
        format!("{:.4} L delivered in 300 s at 10 L/min", used),
    ));
    results.push(check(
        "irrigation_pulses",
        *pulses.borrow() == 60,
        format!("{} pulses", pulses.borrow()),
    ));

    let mut dry = Facility::new(1);
    let id = dry.add_system(IrrigationSystem::new(
        &IrrigationConfig {
            initial_tank: Some(20.0),
            ..Default::default()
        },
        EnvironmentSnapshot::default(),
    ));
    dry.start_all();
    let rec = dry.bus().recorder();
    if let Some(s) = dry.irrigation_mut(id) {
        s.start_run(Some(600.0));
    }
    for _ in 0..20 {
        dry.advance(30.0);
    }
    let exhausted = dry.irrigation(id).is_some_and(|s| s.is_exhausted() && !s.is_watering());
    let notices = rec.count(|n| matches!(n, Notification::ResourceExhausted { resource: Resource::Water, .. }));
    results.push(check(
        "irrigation_auto_stop",
        exhausted && notices == 1,
        format!("exhausted={} notifications={}", exhausted, notices),
    ));

    let refused = dry.irrigation_mut(id).is_some_and(|s| !s.start_run(None));
    let resumed = dry.irrigation_mut(id).is_some_and(|s| {
        s.refill();
        s.start_run(None)
    });
    results.push(check(
        "irrigation_refill_restart",
        refused && resumed,
        "exhausted tank refuses runs until refilled".into(),
    ));

    if verbose {
        println!("    {} notifications on dry run", rec.len());
    }
    results
}

// ── 5. Sensors ──────────────────────────────────────────────────────────

fn validate_sensors(verbose: bool) -> Vec<TestResult> {
    println!("--- Sensors ---");
    let mut results = Vec::new();

    // Hard bounds under hostile calibration and extreme ground truth.
    let mut violations = 0;
    let mut samples = 0;
    for kind in SensorType::ALL {
        let (min, max) = kind.bounds();
        let mut sensor = Sensor::new("sweep", kind, SensorSource::Ambient)
            .with_profile(SensorProfile::new(0.5, 1.5, 0.1));
        sensor.set_calibration(max, 10.0);
        for i in 0..2_000 {
            let raw = match i % 4 {
                0 => min - 1e6,
                1 => max + 1e6,
                2 => f32::NAN,
                _ => min + (max - min) * (i as f32 / 2_000.0),
            };
            let env = {
                let mut env = EnvironmentSnapshot::default();
                env.set(kind.field(), raw);
                env
            };
            let r = sensor.sample(&env, i as f64);
            samples += 1;
            if !(min..=max).contains(&r.value) {
                violations += 1;
            }
        }
    }
    results.push(check(
        "sensor_hard_bounds",
        violations == 0,
        format!("{} of {} samples out of bounds", violations, samples),
    ));

    let mut facility = Facility::new(3);
    facility.set_ambient(EnvironmentSnapshot {
        temperature: 45.0,
        ..Default::default()
    });
    let probe = facility.add_sensor(
        Sensor::new("probe", SensorType::Temperature, SensorSource::Ambient)
            .with_profile(SensorProfile::IDEAL)
            .with_connectivity(Connectivity::reliable()),
    );
    let rec = facility.bus().recorder();
    let alerts = |rec: &verdant_core::events::Recorder| {
        rec.count(|n| matches!(n, Notification::AlertRaised(_)))
    };
    facility.advance(1.0);
    facility.advance(1.0);
    let within = alerts(&rec);
    for _ in 0..60 {
        facility.advance(1.0);
    }
    let after = alerts(&rec);
    results.push(check(
        "sensor_alert_cooldown",
        within == 1 && after == 2,
        format!("{} inside cooldown, {} after", within, after),
    ));

    let history = facility.sensor(probe).map(|s| s.history().len()).unwrap_or(0);
    for _ in 0..1_000 {
        facility.advance(1.0);
    }
    let bounded = facility
        .sensor(probe)
        .is_some_and(|s| s.history().len() == s.history().capacity());
    results.push(check(
        "sensor_history_bounded",
        bounded,
        format!("{} samples before, capped after 1000 more", history),
    ));

    if verbose {
        if let Some(snapshot) = facility.sensor_snapshot(probe) {
            println!(
                "    probe mean {:.2} σ {:.3} ({} samples)",
                snapshot.analytics.mean, snapshot.analytics.std_dev, snapshot.analytics.count
            );
        }
    }
    results
}

// ── 6. Day replay ───────────────────────────────────────────────────────

fn validate_day(config: &FacilityConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Day Replay ---");
    let mut results = Vec::new();

    let mut facility = Facility::from_config(config);
    let rec = facility.bus().recorder();
    let mut last_energy = 0.0f64;
    let mut monotonic = true;
    for _ in 0..(24 * 60) {
        facility.advance(60.0);
        let energy = facility.total_energy_kwh();
        if energy < last_energy {
            monotonic = false;
        }
        last_energy = energy;
    }
    results.push(check(
        "day_energy_monotonic",
        monotonic && last_energy > 0.0,
        format!("{:.2} kWh over 24 h", last_energy),
    ));

    let exclusive = facility.status_all().iter().all(|s| {
        let on = |ch| s.channel(ch).is_some_and(|c| c.active);
        !(on(Channel::Heating) && on(Channel::Cooling))
            && !(on(Channel::Humidify) && on(Channel::Dehumidify))
            && !(on(Channel::Exhaust) && on(Channel::Enrichment))
    });
    results.push(check(
        "day_channels_exclusive",
        exclusive,
        "no opposed pair active at end of day".into(),
    ));

    let mut replay = Facility::from_config(config);
    for _ in 0..(24 * 60) {
        replay.advance(60.0);
    }
    results.push(check(
        "day_deterministic",
        replay.sensor_snapshots() == facility.sensor_snapshots(),
        "same seed and deltas give identical sensor state".into(),
    ));

    let mut buf = Vec::new();
    let saved = facility.save(&mut buf);
    let mut restored = Facility::new(0);
    let loaded = saved.and_then(|_| restored.load(&buf[..]));
    results.push(check(
        "day_save_load",
        loaded.is_ok() && restored.status_all() == facility.status_all(),
        match &loaded {
            Ok(()) => format!("{} bytes", buf.len()),
            Err(e) => e.to_string(),
        },
    ));

    facility.reset_energy();
    results.push(check(
        "day_energy_reset",
        facility.total_energy_kwh() == 0.0,
        "administrative reset zeroes every ledger".into(),
    ));

    if verbose {
        println!("    {} notifications over the day", rec.len());
        for status in facility.status_all() {
            println!(
                "    {:<10} cycles {:>4}  {:>7.2} h",
                status.name, status.cycles, status.operating_hours
            );
        }
        if let Ok(text) = serde_json::to_string_pretty(&facility.sensor_snapshots()) {
            println!("{}", text);
        }
    }
    results
}
