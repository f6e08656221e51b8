//! Physical ranges and tuning constants: setter clamps, drift rates, power draws.
//!
//! Every manual setter clamps into one of these ranges, so the values here are
//! the documented contract for "what the engine will accept". The rates are
//! tuned for simulation pacing, not for engineering accuracy.

/// Climate (temperature + humidity) ranges and rates.
pub mod climate {
    /// Accepted temperature target range (°C).
    pub const TARGET_TEMP_MIN: f32 = 15.0;
    pub const TARGET_TEMP_MAX: f32 = 35.0;
    /// Accepted humidity target range (%RH).
    pub const TARGET_HUMIDITY_MIN: f32 = 30.0;
    pub const TARGET_HUMIDITY_MAX: f32 = 90.0;
    /// Accepted deadband for either axis.
    pub const TOLERANCE_MIN: f32 = 0.1;
    pub const TOLERANCE_MAX: f32 = 5.0;

    /// Heating drives temperature toward this ceiling.
    pub const TEMP_CEILING: f32 = 40.0;
    /// Cooling drives temperature toward this floor.
    pub const TEMP_FLOOR: f32 = 5.0;
    /// Humidifier ceiling / dehumidifier floor (%RH).
    pub const HUMIDITY_CEILING: f32 = 95.0;
    pub const HUMIDITY_FLOOR: f32 = 20.0;

    /// °C per second per effective kW of heating or cooling.
    pub const TEMP_RATE_PER_KW: f32 = 0.001;
    /// %RH per second at full humidifier/dehumidifier output.
    pub const HUMIDITY_RATE: f32 = 0.02;
    /// Fraction of the gap to ambient closed per second while idle.
    pub const PASSIVE_DRIFT: f32 = 1.0 / 3600.0;

    pub const DEFAULT_HEATING_KW: f32 = 10.0;
    pub const DEFAULT_COOLING_KW: f32 = 8.0;
    pub const DEFAULT_EFFICIENCY: f32 = 0.85;
    pub const HUMIDIFIER_WATTS: f32 = 300.0;
    pub const DEHUMIDIFIER_WATTS: f32 = 500.0;
    /// Controller + standby draw while operational.
    pub const BASELINE_WATTS: f32 = 15.0;
}

/// Ventilation / CO2 exchange.
pub mod ventilation {
    /// Accepted CO2 target range (ppm).
    pub const TARGET_CO2_MIN: f32 = 400.0;
    pub const TARGET_CO2_MAX: f32 = 2000.0;
    pub const TOLERANCE_MIN: f32 = 10.0;
    pub const TOLERANCE_MAX: f32 = 500.0;

    /// Exhaust pulls CO2 toward outdoor air.
    pub const OUTDOOR_CO2: f32 = 420.0;
    /// Enrichment pushes CO2 toward this ceiling.
    pub const ENRICHMENT_CEILING: f32 = 2000.0;
    /// ppm per second at full fan intensity per unit of fan capacity.
    pub const EXHAUST_RATE: f32 = 2.0;
    /// ppm per second while the injector is open.
    pub const INJECTION_RATE: f32 = 1.5;
    pub const PASSIVE_DRIFT: f32 = 1.0 / 1800.0;

    /// Lowest fan intensity once the exhaust is running.
    pub const MIN_FAN_INTENSITY: f32 = 0.2;
    /// Excess above the band (ppm) at which the fan reaches full intensity.
    pub const FULL_SPEED_EXCESS: f32 = 400.0;
    /// Airflow (m/s) at full fan intensity.
    pub const MAX_AIRFLOW: f32 = 2.5;
    pub const FAN_WATTS: f32 = 250.0;
    pub const INJECTOR_WATTS: f32 = 40.0;
    pub const BASELINE_WATTS: f32 = 10.0;
}

/// Irrigation and nutrient dosing.
pub mod irrigation {
    /// Accepted flow rate (L/min).
    pub const FLOW_RATE_MIN: f32 = 0.1;
    pub const FLOW_RATE_MAX: f32 = 50.0;
    /// Accepted tank capacity (L).
    pub const TANK_CAPACITY_MIN: f32 = 1.0;
    pub const TANK_CAPACITY_MAX: f32 = 10_000.0;
    /// Accepted substrate moisture target (%).
    pub const TARGET_MOISTURE_MIN: f32 = 10.0;
    pub const TARGET_MOISTURE_MAX: f32 = 90.0;
    pub const TOLERANCE_MIN: f32 = 1.0;
    pub const TOLERANCE_MAX: f32 = 30.0;
    /// Accepted nutrient dosing ratio (mL per litre of water).
    pub const DOSE_RATIO_MAX: f32 = 20.0;

    /// Moisture % gained per litre delivered.
    pub const MOISTURE_PER_LITRE: f32 = 0.5;
    /// Substrate dries toward this level while idle.
    pub const DRY_BASELINE: f32 = 15.0;
    pub const PASSIVE_DRIFT: f32 = 1.0 / 7200.0;
    /// Seconds between watering pulses inside a run.
    pub const PULSE_INTERVAL_SECS: f32 = 5.0;
    /// Tank fraction below which a low-level notification fires.
    pub const LOW_LEVEL_FRACTION: f32 = 0.15;

    pub const PUMP_WATTS_PER_LPM: f32 = 12.0;
    pub const DOSING_PUMP_WATTS: f32 = 8.0;
    pub const BASELINE_WATTS: f32 = 5.0;
}

/// Lighting and spectrum.
pub mod lighting {
    /// Lamp intensity is a 0..1 fraction of rated output.
    pub const INTENSITY_MIN: f32 = 0.0;
    pub const INTENSITY_MAX: f32 = 1.0;
    /// PPFD (µmol/m²/s) at full intensity.
    pub const DEFAULT_MAX_PPFD: f32 = 900.0;
    pub const DEFAULT_LAMP_WATTS: f32 = 600.0;
    pub const BASELINE_WATTS: f32 = 5.0;
    /// Fallback photoperiod when no schedule is configured.
    pub const DEFAULT_PHOTOPERIOD_START: f32 = 6.0;
    pub const DEFAULT_PHOTOPERIOD_HOURS: f32 = 16.0;
}

/// Sensor setter ranges.
pub mod sensor {
    /// Accepted calibration multiplier.
    pub const MULTIPLIER_MIN: f32 = 0.1;
    pub const MULTIPLIER_MAX: f32 = 10.0;
    /// Shortest accepted sample interval (s).
    pub const SAMPLE_INTERVAL_MIN: f32 = 0.05;
    pub const QUEUE_CAPACITY_MAX: usize = 1024;
}

/// Engine cadence defaults (seconds of simulated time).
pub mod cadence {
    /// How often schedules are re-evaluated.
    pub const SCHEDULE_INTERVAL_SECS: f32 = 5.0;
    /// How often a sensor takes a sample.
    pub const SAMPLE_INTERVAL_SECS: f32 = 1.0;
    /// How often a sensor's online state may flip.
    pub const CONNECTIVITY_INTERVAL_SECS: f32 = 30.0;
    /// Alert re-fire cooldown.
    pub const ALERT_COOLDOWN_SECS: f32 = 60.0;
    /// Chance per connectivity check that an online sensor drops out.
    pub const DROP_PROBABILITY: f32 = 0.02;
    /// Chance per connectivity check that an offline sensor reconnects.
    pub const RECOVER_PROBABILITY: f32 = 0.5;
    /// Packets a sensor sends per sample while online.
    pub const PACKETS_PER_TRANSMISSION: usize = 4;
    pub const PACKET_QUEUE_CAPACITY: usize = 32;
    pub const SECONDS_PER_HOUR: f32 = 3600.0;
    pub const SECONDS_PER_DAY: f64 = 86_400.0;
}
