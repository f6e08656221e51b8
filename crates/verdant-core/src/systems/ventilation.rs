//! Ventilation - exhaust fan and CO2 enrichment on one CO2 axis
//!
//! The exhaust lowers CO2 toward outdoor air at a fan intensity proportional
//! to how far the reading sits above the band. Schedule windows are forced
//! air-exchange (purge) windows: the exhaust runs at the window parameter
//! regardless of CO2. Without a schedule there is never a purge.

use log::debug;
use serde::{Deserialize, Serialize};
use verdant_logic::constants::ventilation::*;
use verdant_logic::control::{clamp_setting, ChannelSet, Direction, Setpoint};
use verdant_logic::environment::{EnvField, EnvironmentSnapshot};
use verdant_logic::ledger::{total_power, PowerDraw};
use verdant_logic::rate::{AxisDynamics, ControlledAxis};
use verdant_logic::schedule::{GateChange, Schedule, ScheduleFallback};

use super::{
    AxisStatus, ChannelStatus, Quantity, StatusDetail, Subsystem, SubsystemKind, SubsystemStatus,
    SystemCore,
};
use crate::events::Channel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VentilationConfig {
    pub name: String,
    pub target_co2: f32,
    pub co2_tolerance: f32,
    /// Exhaust capacity multiplier on the base exchange rate.
    pub fan_capacity: f32,
    /// Without an injector the axis is lower-only.
    pub enrichment: bool,
    pub initial_co2: Option<f32>,
    pub schedule: Option<Schedule>,
    pub automated: bool,
}

impl Default for VentilationConfig {
    fn default() -> Self {
        Self {
            name: "ventilation".to_string(),
            target_co2: 800.0,
            co2_tolerance: 100.0,
            fan_capacity: 1.0,
            enrichment: true,
            initial_co2: None,
            schedule: None,
            automated: true,
        }
    }
}

/// Fan intensity for a given excess above the band, within `[MIN_FAN_INTENSITY, 1]`.
pub fn exhaust_intensity(excess_ppm: f32) -> f32 {
    let span = 1.0 - MIN_FAN_INTENSITY;
    (MIN_FAN_INTENSITY + span * excess_ppm.max(0.0) / FULL_SPEED_EXCESS)
        .clamp(MIN_FAN_INTENSITY, 1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VentilationSystem {
    pub core: SystemCore,
    co2: ControlledAxis,
    fan_intensity: f32,
    fan_capacity: f32,
    enrichment: bool,
    purging: bool,
}

impl VentilationSystem {
    pub fn new(config: &VentilationConfig, ambient: EnvironmentSnapshot) -> Self {
        let co2 = ControlledAxis::new(
            config.initial_co2.unwrap_or(ambient.co2),
            Setpoint::new(800.0, 100.0),
            ChannelSet::BIPOLAR,
            AxisDynamics::linear(OUTDOOR_CO2, ENRICHMENT_CEILING, PASSIVE_DRIFT),
        )
        .with_rates(INJECTION_RATE, EXHAUST_RATE);

        let mut system = Self {
            core: SystemCore::new(config.name.clone(), ambient),
            co2,
            fan_intensity: 0.0,
            fan_capacity: 1.0,
            enrichment: true,
            purging: false,
        };
        system.set_target_co2(config.target_co2);
        system.set_co2_tolerance(config.co2_tolerance);
        system.set_fan_capacity(config.fan_capacity);
        system.set_enrichment_available(config.enrichment);
        system.core.set_schedule(config.schedule.clone());
        if !config.automated {
            system.core.set_automated(false);
        }
        system
    }

    pub fn co2(&self) -> f32 {
        self.co2.current
    }

    pub fn setpoint(&self) -> Setpoint {
        self.co2.setpoint()
    }

    pub fn is_exhausting(&self) -> bool {
        self.co2.channels().lower
    }

    pub fn is_enriching(&self) -> bool {
        self.co2.channels().raise
    }

    pub fn has_enrichment(&self) -> bool {
        self.enrichment
    }

    pub fn is_purging(&self) -> bool {
        self.purging
    }

    /// 0 while the exhaust is off.
    pub fn fan_intensity(&self) -> f32 {
        if self.is_exhausting() {
            self.fan_intensity
        } else {
            0.0
        }
    }

    /// Forced airflow in m/s.
    pub fn airflow(&self) -> f32 {
        self.fan_intensity() * MAX_AIRFLOW
    }

    // ── Manual control ────────────────────────────────────────────────

    pub fn set_target_co2(&mut self, ppm: f32) {
        self.co2.controller.setpoint.target = clamp_setting(ppm, TARGET_CO2_MIN, TARGET_CO2_MAX);
    }

    pub fn set_co2_tolerance(&mut self, ppm: f32) {
        self.co2.controller.setpoint.tolerance = clamp_setting(ppm, TOLERANCE_MIN, TOLERANCE_MAX);
    }

    pub fn set_fan_capacity(&mut self, capacity: f32) {
        self.fan_capacity = clamp_setting(capacity, 0.1, 10.0);
        self.co2.lower_rate = EXHAUST_RATE * self.fan_capacity;
    }

    /// Remove or install the CO2 injector.
    pub fn set_enrichment_available(&mut self, available: bool) {
        self.enrichment = available;
        let channels = if available {
            ChannelSet::BIPOLAR
        } else {
            ChannelSet::LOWER_ONLY
        };
        let t = self.co2.controller.set_channels(channels);
        self.core.announce(t, Channel::Enrichment, Channel::Exhaust, false);
    }

    /// Manual fan intensity, `[0, 1]`. Takes effect in manual mode.
    pub fn set_fan_intensity(&mut self, intensity: f32) {
        self.fan_intensity = clamp_setting(intensity, 0.0, 1.0);
    }

    pub fn set_exhaust(&mut self, on: bool) -> bool {
        self.manual_toggle(Direction::Lower, on)
    }

    pub fn set_enrichment(&mut self, on: bool) -> bool {
        self.manual_toggle(Direction::Raise, on)
    }

    fn manual_toggle(&mut self, dir: Direction, on: bool) -> bool {
        if !self.core.is_operational() || self.core.is_automated() {
            debug!("{} manual toggle ignored (automated or stopped)", self.core.name);
            return false;
        }
        if dir == Direction::Lower && on && self.fan_intensity <= 0.0 {
            self.fan_intensity = 1.0;
        }
        let t = self.co2.controller.set_manual(dir, on);
        self.core.announce(t, Channel::Enrichment, Channel::Exhaust, false);
        true
    }

    fn run_automation(&mut self, dt: f32) {
        match self.core.poll_schedule(dt, ScheduleFallback::Inactive) {
            GateChange::Opened(p) | GateChange::Retuned(p) => {
                self.purging = true;
                self.fan_intensity = clamp_setting(p, MIN_FAN_INTENSITY, 1.0);
            }
            GateChange::Closed => self.purging = false,
            GateChange::Unchanged => {}
        }

        if self.purging {
            let t = self.co2.controller.set_manual(Direction::Lower, true);
            self.core.announce(t, Channel::Enrichment, Channel::Exhaust, true);
            return;
        }

        let t = self.co2.decide();
        self.core.announce(t, Channel::Enrichment, Channel::Exhaust, true);
        if self.is_exhausting() {
            let excess = self.co2.setpoint().excess(self.co2.measured());
            self.fan_intensity = exhaust_intensity(excess);
        }
    }
}

impl Subsystem for VentilationSystem {
    fn core(&self) -> &SystemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SystemCore {
        &mut self.core
    }

    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Ventilation
    }

    fn advance(&mut self, dt_secs: f32) {
        let dt = self.core.tick(dt_secs);
        if self.core.is_driving() {
            self.run_automation(dt);
        }

        let ambient = self.core.ambient;
        let drive = if self.is_exhausting() {
            self.fan_intensity
        } else {
            1.0
        };
        self.co2.step(dt, ambient.co2, drive);

        let power = self.power_w();
        self.core.book(power, dt);
    }

    fn stop(&mut self) {
        let t = self.co2.controller.release();
        self.core.announce(t, Channel::Enrichment, Channel::Exhaust, false);
        self.purging = false;
        self.core.stop();
    }

    fn set_automated(&mut self, automated: bool) {
        if self.core.set_automated(automated) {
            self.purging = false;
        }
    }

    fn observe(&mut self, field: EnvField, value: Option<f32>) {
        if field == EnvField::Co2 {
            self.co2.observe(value);
        }
    }

    fn contribute(&self, env: &mut EnvironmentSnapshot) {
        env.co2 = self.co2.current;
        env.airflow += self.airflow();
    }

    fn power_w(&self) -> f32 {
        total_power(
            BASELINE_WATTS,
            &[
                PowerDraw::new(FAN_WATTS * self.fan_capacity * self.fan_intensity(), self.is_exhausting()),
                PowerDraw::new(INJECTOR_WATTS, self.is_enriching()),
            ],
            self.core.is_operational(),
        )
    }

    fn status(&self) -> SubsystemStatus {
        let mut status = SubsystemStatus::base(&self.core, self.kind(), self.power_w());
        let sp = self.co2.setpoint();
        status.axes.push(AxisStatus {
            quantity: Quantity::Co2,
            current: self.co2.current,
            target: sp.target,
            tolerance: sp.tolerance,
            within_band: sp.contains(self.co2.current),
        });
        status.channels = vec![
            ChannelStatus {
                channel: Channel::Exhaust,
                active: self.is_exhausting(),
                level: self.fan_intensity(),
            },
            ChannelStatus::switch(Channel::Enrichment, self.is_enriching()),
        ];
        status.detail = StatusDetail::Ventilation {
            fan_intensity: self.fan_intensity(),
            airflow: self.airflow(),
            purging: self.purging,
        };
        status
    }
}
