//! Climate control - heating/cooling and humidify/dehumidify on two axes
//!
//! A schedule, when set, is a setback schedule: inside a window the
//! temperature target becomes the window parameter. Without a schedule no
//! setback is ever active and the base target is tracked.

use log::debug;
use serde::{Deserialize, Serialize};
use verdant_logic::constants::climate::*;
use verdant_logic::control::{clamp_setting, ChannelSet, Direction, Setpoint};
use verdant_logic::environment::{EnvField, EnvironmentSnapshot};
use verdant_logic::ledger::{total_power, PowerDraw};
use verdant_logic::rate::{active_rate, AxisDynamics, ControlledAxis};
use verdant_logic::schedule::{Schedule, ScheduleFallback};

use super::{AxisStatus, ChannelStatus, Quantity, Subsystem, SubsystemKind, SubsystemStatus, SystemCore};
use crate::events::Channel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub name: String,
    pub target_temperature: f32,
    pub temperature_tolerance: f32,
    pub target_humidity: f32,
    pub humidity_tolerance: f32,
    pub heating_kw: f32,
    pub cooling_kw: f32,
    pub efficiency: f32,
    /// Starting values; ambient when absent.
    pub initial_temperature: Option<f32>,
    pub initial_humidity: Option<f32>,
    pub schedule: Option<Schedule>,
    pub automated: bool,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            name: "climate".to_string(),
            target_temperature: 23.0,
            temperature_tolerance: 1.0,
            target_humidity: 60.0,
            humidity_tolerance: 5.0,
            heating_kw: DEFAULT_HEATING_KW,
            cooling_kw: DEFAULT_COOLING_KW,
            efficiency: DEFAULT_EFFICIENCY,
            initial_temperature: None,
            initial_humidity: None,
            schedule: None,
            automated: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateSystem {
    pub core: SystemCore,
    temperature: ControlledAxis,
    humidity: ControlledAxis,
    /// Target outside any setback window.
    base_temperature: f32,
    heating_kw: f32,
    cooling_kw: f32,
    efficiency: f32,
}

impl ClimateSystem {
    pub fn new(config: &ClimateConfig, ambient: EnvironmentSnapshot) -> Self {
        let temperature = ControlledAxis::new(
            config.initial_temperature.unwrap_or(ambient.temperature),
            Setpoint::new(23.0, 1.0),
            ChannelSet::BIPOLAR,
            AxisDynamics::linear(TEMP_FLOOR, TEMP_CEILING, PASSIVE_DRIFT),
        );
        let humidity = ControlledAxis::new(
            config.initial_humidity.unwrap_or(ambient.humidity),
            Setpoint::new(60.0, 5.0),
            ChannelSet::BIPOLAR,
            AxisDynamics::linear(HUMIDITY_FLOOR, HUMIDITY_CEILING, PASSIVE_DRIFT),
        )
        .with_rates(HUMIDITY_RATE, HUMIDITY_RATE);

        let mut system = Self {
            core: SystemCore::new(config.name.clone(), ambient),
            temperature,
            humidity,
            base_temperature: 23.0,
            heating_kw: 0.0,
            cooling_kw: 0.0,
            efficiency: 0.0,
        };
        system.set_target_temperature(config.target_temperature);
        system.set_temperature_tolerance(config.temperature_tolerance);
        system.set_target_humidity(config.target_humidity);
        system.set_humidity_tolerance(config.humidity_tolerance);
        system.set_capacity(config.heating_kw, config.cooling_kw, config.efficiency);
        system.core.set_schedule(config.schedule.clone());
        if !config.automated {
            system.core.set_automated(false);
        }
        system
    }

    // ── Readings ──────────────────────────────────────────────────────

    pub fn temperature(&self) -> f32 {
        self.temperature.current
    }

    pub fn humidity(&self) -> f32 {
        self.humidity.current
    }

    pub fn temperature_setpoint(&self) -> Setpoint {
        self.temperature.setpoint()
    }

    pub fn humidity_setpoint(&self) -> Setpoint {
        self.humidity.setpoint()
    }

    pub fn is_heating(&self) -> bool {
        self.temperature.channels().raise
    }

    pub fn is_cooling(&self) -> bool {
        self.temperature.channels().lower
    }

    pub fn is_humidifying(&self) -> bool {
        self.humidity.channels().raise
    }

    pub fn is_dehumidifying(&self) -> bool {
        self.humidity.channels().lower
    }

    pub fn setback_active(&self) -> bool {
        self.core.is_automated() && self.core.schedule_open()
    }

    // ── Manual control ────────────────────────────────────────────────

    /// Base target, clamped to the accepted range.
    pub fn set_target_temperature(&mut self, celsius: f32) {
        self.base_temperature = clamp_setting(celsius, TARGET_TEMP_MIN, TARGET_TEMP_MAX);
        self.temperature.controller.setpoint.target = self.effective_temperature_target();
    }

    pub fn set_temperature_tolerance(&mut self, tolerance: f32) {
        self.temperature.controller.setpoint.tolerance =
            clamp_setting(tolerance, TOLERANCE_MIN, TOLERANCE_MAX);
    }

    pub fn set_target_humidity(&mut self, percent: f32) {
        self.humidity.controller.setpoint.target =
            clamp_setting(percent, TARGET_HUMIDITY_MIN, TARGET_HUMIDITY_MAX);
    }

    pub fn set_humidity_tolerance(&mut self, tolerance: f32) {
        self.humidity.controller.setpoint.tolerance =
            clamp_setting(tolerance, TOLERANCE_MIN, TOLERANCE_MAX);
    }

    /// Rated heating/cooling capacity (kW) and efficiency.
    pub fn set_capacity(&mut self, heating_kw: f32, cooling_kw: f32, efficiency: f32) {
        self.heating_kw = clamp_setting(heating_kw, 0.0, 100.0);
        self.cooling_kw = clamp_setting(cooling_kw, 0.0, 100.0);
        self.efficiency = clamp_setting(efficiency, 0.1, 1.0);
        self.temperature.raise_rate = active_rate(self.heating_kw, self.efficiency, TEMP_RATE_PER_KW);
        self.temperature.lower_rate = active_rate(self.cooling_kw, self.efficiency, TEMP_RATE_PER_KW);
    }

    /// Manual toggles apply only in manual mode on a running system.
    pub fn set_heating(&mut self, on: bool) -> bool {
        self.manual_toggle(false, Direction::Raise, on)
    }

    pub fn set_cooling(&mut self, on: bool) -> bool {
        self.manual_toggle(false, Direction::Lower, on)
    }

    pub fn set_humidifier(&mut self, on: bool) -> bool {
        self.manual_toggle(true, Direction::Raise, on)
    }

    pub fn set_dehumidifier(&mut self, on: bool) -> bool {
        self.manual_toggle(true, Direction::Lower, on)
    }

    fn manual_toggle(&mut self, humidity: bool, dir: Direction, on: bool) -> bool {
        if !self.core.is_operational() || self.core.is_automated() {
            debug!("{} manual toggle ignored (automated or stopped)", self.core.name);
            return false;
        }
        if humidity {
            let t = self.humidity.controller.set_manual(dir, on);
            self.core.announce(t, Channel::Humidify, Channel::Dehumidify, false);
        } else {
            let t = self.temperature.controller.set_manual(dir, on);
            self.core.announce(t, Channel::Heating, Channel::Cooling, false);
        }
        true
    }

    fn effective_temperature_target(&self) -> f32 {
        if self.setback_active() {
            clamp_setting(self.core.schedule_parameter(), TARGET_TEMP_MIN, TARGET_TEMP_MAX)
        } else {
            self.base_temperature
        }
    }
}

impl Subsystem for ClimateSystem {
    fn core(&self) -> &SystemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SystemCore {
        &mut self.core
    }

    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Climate
    }

    fn advance(&mut self, dt_secs: f32) {
        let dt = self.core.tick(dt_secs);

        if self.core.is_driving() {
            self.core.poll_schedule(dt, ScheduleFallback::Inactive);
            self.temperature.controller.setpoint.target = self.effective_temperature_target();

            let t = self.temperature.decide();
            self.core.announce(t, Channel::Heating, Channel::Cooling, true);
            let h = self.humidity.decide();
            self.core.announce(h, Channel::Humidify, Channel::Dehumidify, true);
        }

        let ambient = self.core.ambient;
        self.temperature.step(dt, ambient.temperature, 1.0);
        self.humidity.step(dt, ambient.humidity, 1.0);

        let power = self.power_w();
        self.core.book(power, dt);
    }

    fn stop(&mut self) {
        let t = self.temperature.controller.release();
        self.core.announce(t, Channel::Heating, Channel::Cooling, false);
        let h = self.humidity.controller.release();
        self.core.announce(h, Channel::Humidify, Channel::Dehumidify, false);
        self.core.stop();
        self.temperature.controller.setpoint.target = self.effective_temperature_target();
    }

    fn set_automated(&mut self, automated: bool) {
        self.core.set_automated(automated);
        self.temperature.controller.setpoint.target = self.effective_temperature_target();
    }

    fn observe(&mut self, field: EnvField, value: Option<f32>) {
        match field {
            EnvField::Temperature => self.temperature.observe(value),
            EnvField::Humidity => self.humidity.observe(value),
            _ => {}
        }
    }

    fn contribute(&self, env: &mut EnvironmentSnapshot) {
        env.temperature = self.temperature.current;
        env.humidity = self.humidity.current;
    }

    fn power_w(&self) -> f32 {
        let t = self.temperature.channels();
        let h = self.humidity.channels();
        total_power(
            BASELINE_WATTS,
            &[
                PowerDraw::new(self.heating_kw * 1000.0, t.raise),
                PowerDraw::new(self.cooling_kw * 1000.0, t.lower),
                PowerDraw::new(HUMIDIFIER_WATTS, h.raise),
                PowerDraw::new(DEHUMIDIFIER_WATTS, h.lower),
            ],
            self.core.is_operational(),
        )
    }

    fn status(&self) -> SubsystemStatus {
        let mut status = SubsystemStatus::base(&self.core, self.kind(), self.power_w());
        for (quantity, axis) in [
            (Quantity::Temperature, &self.temperature),
            (Quantity::Humidity, &self.humidity),
        ] {
            let sp = axis.setpoint();
            status.axes.push(AxisStatus {
                quantity,
                current: axis.current,
                target: sp.target,
                tolerance: sp.tolerance,
                within_band: sp.contains(axis.current),
            });
        }
        status.channels = vec![
            ChannelStatus::switch(Channel::Heating, self.is_heating()),
            ChannelStatus::switch(Channel::Cooling, self.is_cooling()),
            ChannelStatus::switch(Channel::Humidify, self.is_humidifying()),
            ChannelStatus::switch(Channel::Dehumidify, self.is_dehumidifying()),
        ];
        status
    }
}
