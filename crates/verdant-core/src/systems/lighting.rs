//! Lighting - lamp intensity and spectrum, no thermal inertia
//!
//! Intensity snaps to its target on the tick automation decides. Inside a
//! schedule window the lamps run at the window parameter, or at the target
//! intensity when the parameter is 0. With no schedule the lamps follow a
//! fixed photoperiod instead.

use log::debug;
use serde::{Deserialize, Serialize};
use verdant_logic::constants::lighting::*;
use verdant_logic::control::{clamp_setting, ChannelSet, Direction, Setpoint};
use verdant_logic::environment::EnvironmentSnapshot;
use verdant_logic::ledger::{total_power, PowerDraw};
use verdant_logic::rate::{AxisDynamics, ControlledAxis};
use verdant_logic::schedule::{GateChange, Photoperiod, Schedule, ScheduleFallback};

use super::{
    AxisStatus, ChannelStatus, Quantity, StatusDetail, Subsystem, SubsystemKind, SubsystemStatus,
    SystemCore,
};
use crate::events::Channel;

/// Spectrum presets as blue/red/far-red fractions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spectrum {
    Vegetative,
    Flowering,
    #[default]
    FullSpectrum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRatios {
    pub blue: f32,
    pub red: f32,
    pub far_red: f32,
}

impl Spectrum {
    pub fn ratios(&self) -> SpectrumRatios {
        match self {
            Spectrum::Vegetative => SpectrumRatios {
                blue: 0.45,
                red: 0.50,
                far_red: 0.05,
            },
            Spectrum::Flowering => SpectrumRatios {
                blue: 0.15,
                red: 0.70,
                far_red: 0.15,
            },
            Spectrum::FullSpectrum => SpectrumRatios {
                blue: 0.30,
                red: 0.60,
                far_red: 0.10,
            },
        }
    }

    /// Photosynthetic output relative to rated PPFD. Far-red counts less.
    pub fn efficacy(&self) -> f32 {
        let r = self.ratios();
        r.blue + r.red + 0.5 * r.far_red
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub name: String,
    pub lamp_watts: f32,
    /// PPFD at full intensity.
    pub max_ppfd: f32,
    pub target_intensity: f32,
    pub spectrum: Spectrum,
    pub photoperiod: Photoperiod,
    pub schedule: Option<Schedule>,
    pub automated: bool,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            name: "lighting".to_string(),
            lamp_watts: DEFAULT_LAMP_WATTS,
            max_ppfd: DEFAULT_MAX_PPFD,
            target_intensity: 1.0,
            spectrum: Spectrum::default(),
            photoperiod: Photoperiod::default(),
            schedule: None,
            automated: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightingSystem {
    pub core: SystemCore,
    intensity: ControlledAxis,
    /// Intensity used when a window parameter is 0, and by manual mode.
    target_intensity: f32,
    lamp_watts: f32,
    max_ppfd: f32,
    spectrum: Spectrum,
    photoperiod: Photoperiod,
}

impl LightingSystem {
    pub fn new(config: &LightingConfig, ambient: EnvironmentSnapshot) -> Self {
        let intensity = ControlledAxis::new(
            0.0,
            Setpoint::new(1.0, 0.0),
            ChannelSet::RAISE_ONLY,
            AxisDynamics::instant(INTENSITY_MIN, INTENSITY_MAX),
        );
        let mut system = Self {
            core: SystemCore::new(config.name.clone(), ambient),
            intensity,
            target_intensity: 1.0,
            lamp_watts: DEFAULT_LAMP_WATTS,
            max_ppfd: DEFAULT_MAX_PPFD,
            spectrum: config.spectrum,
            photoperiod: config.photoperiod,
        };
        system.set_lamp_watts(config.lamp_watts);
        system.set_max_ppfd(config.max_ppfd);
        system.set_intensity(config.target_intensity);
        system.core.set_schedule(config.schedule.clone());
        if !config.automated {
            system.core.set_automated(false);
        }
        system
    }

    pub fn intensity(&self) -> f32 {
        self.intensity.current
    }

    pub fn lamps_on(&self) -> bool {
        self.intensity.channels().raise
    }

    pub fn spectrum(&self) -> Spectrum {
        self.spectrum
    }

    pub fn photoperiod(&self) -> Photoperiod {
        self.photoperiod
    }

    /// Light added on top of ambient, µmol/m²/s.
    pub fn ppfd(&self) -> f32 {
        self.intensity.current * self.max_ppfd * self.spectrum.efficacy()
    }

    // ── Manual control ────────────────────────────────────────────────

    /// Target intensity in `[0, 1]`. Applies immediately if lamps are on
    /// outside a parameterised window.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.target_intensity = clamp_setting(intensity, INTENSITY_MIN, INTENSITY_MAX);
        if !(self.core.is_automated() && self.core.schedule_parameter() > 0.0) {
            self.intensity.controller.setpoint.target = self.target_intensity;
        }
    }

    pub fn set_spectrum(&mut self, spectrum: Spectrum) {
        debug!("{} spectrum {:?}", self.core.name, spectrum);
        self.spectrum = spectrum;
    }

    pub fn set_lamp_watts(&mut self, watts: f32) {
        self.lamp_watts = clamp_setting(watts, 0.0, 10_000.0);
    }

    pub fn set_max_ppfd(&mut self, ppfd: f32) {
        self.max_ppfd = clamp_setting(ppfd, 0.0, 2500.0);
    }

    /// Photoperiod used only while no schedule is set.
    pub fn set_photoperiod(&mut self, photoperiod: Photoperiod) {
        self.photoperiod = photoperiod;
        self.core.refresh_schedule();
    }

    pub fn set_lamps(&mut self, on: bool) -> bool {
        if !self.core.is_operational() || self.core.is_automated() {
            debug!("{} manual toggle ignored (automated or stopped)", self.core.name);
            return false;
        }
        self.intensity.controller.setpoint.target = self.target_intensity;
        let t = self.intensity.controller.set_manual(Direction::Raise, on);
        self.core.announce(t, Channel::Lamps, Channel::Lamps, false);
        true
    }

    fn window_intensity(&self, parameter: f32) -> f32 {
        if parameter > 0.0 {
            clamp_setting(parameter, INTENSITY_MIN, INTENSITY_MAX)
        } else {
            self.target_intensity
        }
    }
}

impl Subsystem for LightingSystem {
    fn core(&self) -> &SystemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SystemCore {
        &mut self.core
    }

    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Lighting
    }

    fn advance(&mut self, dt_secs: f32) {
        let dt = self.core.tick(dt_secs);

        if self.core.is_driving() {
            let fallback = ScheduleFallback::Photoperiod(self.photoperiod);
            match self.core.poll_schedule(dt, fallback) {
                GateChange::Opened(p) => {
                    self.intensity.controller.setpoint.target = self.window_intensity(p);
                    let t = self.intensity.controller.set_manual(Direction::Raise, true);
                    self.core.announce(t, Channel::Lamps, Channel::Lamps, true);
                }
                GateChange::Retuned(p) => {
                    self.intensity.controller.setpoint.target = self.window_intensity(p);
                }
                GateChange::Closed => {
                    let t = self.intensity.controller.release();
                    self.core.announce(t, Channel::Lamps, Channel::Lamps, true);
                }
                GateChange::Unchanged => {}
            }
        }

        // Lamps have no inertia: idle means dark.
        self.intensity.step(dt, INTENSITY_MIN, 1.0);

        let power = self.power_w();
        self.core.book(power, dt);
    }

    fn stop(&mut self) {
        let t = self.intensity.controller.release();
        self.core.announce(t, Channel::Lamps, Channel::Lamps, false);
        self.intensity.current = INTENSITY_MIN;
        self.core.stop();
    }

    fn set_automated(&mut self, automated: bool) {
        if self.core.set_automated(automated) && automated {
            // The gate re-opens on the next tick if inside a window.
            let t = self.intensity.controller.release();
            self.core.announce(t, Channel::Lamps, Channel::Lamps, false);
        }
    }

    fn contribute(&self, env: &mut EnvironmentSnapshot) {
        env.light += self.ppfd();
    }

    fn power_w(&self) -> f32 {
        total_power(
            BASELINE_WATTS,
            &[PowerDraw::new(
                self.lamp_watts * self.intensity.current,
                self.lamps_on(),
            )],
            self.core.is_operational(),
        )
    }

    fn status(&self) -> SubsystemStatus {
        let mut status = SubsystemStatus::base(&self.core, self.kind(), self.power_w());
        let sp = self.intensity.setpoint();
        status.axes.push(AxisStatus {
            quantity: Quantity::LightIntensity,
            current: self.intensity.current,
            target: sp.target,
            tolerance: sp.tolerance,
            within_band: sp.contains(self.intensity.current),
        });
        status.channels = vec![ChannelStatus {
            channel: Channel::Lamps,
            active: self.lamps_on(),
            level: self.intensity.current,
        }];
        status.detail = StatusDetail::Lighting {
            spectrum: self.spectrum,
            ppfd: self.ppfd(),
        };
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lamps() -> LightingSystem {
        let mut l = LightingSystem::new(&LightingConfig::default(), EnvironmentSnapshot::default());
        l.core.set_schedule_interval(0.0);
        l.start();
        l
    }

    #[test]
    fn test_photoperiod_fallback() {
        let mut l = lamps();
        l.set_time_of_day(12.0);
        l.advance(1.0);
        assert!(l.lamps_on());
        assert_eq!(l.intensity(), 1.0);
        l.set_time_of_day(23.0);
        l.advance(1.0);
        assert!(!l.lamps_on());
        assert_eq!(l.intensity(), 0.0);
        assert_eq!(l.core.ledger.cycles, 1);
    }

    #[test]
    fn test_schedule_parameter_sets_intensity_same_tick() {
        let mut l = lamps();
        l.set_schedule(Some(Schedule::new().with_entry(20.0, 4.0, 0.4)));
        l.set_time_of_day(12.0);
        l.advance(1.0);
        assert!(!l.lamps_on());
        l.set_time_of_day(21.0);
        l.advance(0.016);
        assert!(l.lamps_on());
        assert!((l.intensity() - 0.4).abs() < 1e-6);
        assert!((l.power_w() - (BASELINE_WATTS + DEFAULT_LAMP_WATTS * 0.4)).abs() < 1e-3);
    }

    #[test]
    fn test_zero_parameter_uses_target() {
        let mut l = lamps();
        l.set_intensity(0.7);
        l.set_schedule(Some(Schedule::new().with_entry(0.0, 12.0, 0.0)));
        l.set_time_of_day(6.0);
        l.advance(1.0);
        assert!((l.intensity() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_contributes_ppfd_over_ambient() {
        let mut l = lamps();
        l.set_time_of_day(12.0);
        l.advance(1.0);
        let mut env = EnvironmentSnapshot {
            light: 50.0,
            ..Default::default()
        };
        l.contribute(&mut env);
        let expected = 50.0 + DEFAULT_MAX_PPFD * Spectrum::FullSpectrum.efficacy();
        assert!((env.light - expected).abs() < 1e-3);
    }

    #[test]
    fn test_manual_lamps() {
        let mut l = lamps();
        l.set_automated(false);
        assert!(l.set_lamps(true));
        l.set_time_of_day(23.0);
        l.advance(1.0);
        assert!(l.lamps_on());
        assert_eq!(l.core.ledger.cycles, 0);
        l.stop();
        assert_eq!(l.power_w(), 0.0);
        assert_eq!(l.intensity(), 0.0);
    }

    #[test]
    fn test_spectrum_efficacy_in_range() {
        for s in [Spectrum::Vegetative, Spectrum::Flowering, Spectrum::FullSpectrum] {
            let e = s.efficacy();
            assert!(e > 0.8 && e <= 1.0);
            let r = s.ratios();
            assert!((r.blue + r.red + r.far_red - 1.0).abs() < 1e-5);
        }
    }
}
