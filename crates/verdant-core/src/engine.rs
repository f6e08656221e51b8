//! Facility - the host loop that owns subsystems, sensors and the bus

use log::{info, warn};
use verdant_logic::environment::EnvironmentSnapshot;
use verdant_logic::ids::{SensorId, SystemId};
use verdant_logic::rate::sanitize_dt;
use verdant_logic::schedule::SimClock;

use crate::events::NotificationBus;
use crate::persistence::{self, LoadedFacility};
use crate::error::PersistError;
use crate::sensor::{Sensor, SensorSnapshot, SensorSource};
use crate::systems::*;

/// A grow facility: one ambient provider, explicitly registered subsystems and
/// sensors, and one notification bus shared by all of them.
#[derive(Debug)]
pub struct Facility {
    seed: u64,
    /// Monotonic simulated seconds since start. Reading timestamps use this.
    sim_time: f64,
    /// Time of day; may be set by the host.
    clock: SimClock,
    ambient: EnvironmentSnapshot,
    systems: Vec<SystemSlot>,
    sensors: Vec<Sensor>,
    bus: NotificationBus,
    time_scale: f32,
}

impl Facility {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            sim_time: 0.0,
            clock: SimClock::default(),
            ambient: EnvironmentSnapshot::default(),
            systems: Vec::new(),
            sensors: Vec::new(),
            bus: NotificationBus::new(),
            time_scale: 1.0,
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    // ── Registration ──────────────────────────────────────────────────

    /// Register a subsystem. It inherits the facility ambient and clock.
    pub fn add_system(&mut self, system: impl Into<SystemSlot>) -> SystemId {
        let mut slot = system.into();
        let id = SystemId(self.systems.len() as u32);
        let core = slot.as_dyn_mut().core_mut();
        core.attach(id, self.bus.clone());
        core.ambient = self.ambient;
        core.clock = self.clock;
        info!("registered {} as {}", core.name, id);
        self.systems.push(slot);
        id
    }

    /// Register a sensor. A source naming an unknown subsystem falls back to
    /// the zone snapshot.
    pub fn add_sensor(&mut self, mut sensor: Sensor) -> SensorId {
        let id = SensorId(self.sensors.len() as u32);
        if let SensorSource::System(sys) = sensor.source {
            if self.system(sys).is_none() {
                warn!("{} reads unknown {}; using zone", sensor.name, sys);
                sensor.source = SensorSource::Zone;
            }
        }
        if let Some(sys) = sensor.feeds {
            if self.system(sys).is_none() {
                warn!("{} feeds unknown {}; link dropped", sensor.name, sys);
                sensor.feeds = None;
            }
        }
        sensor.attach(id, self.seed, self.bus.clone());
        self.sensors.push(sensor);
        id
    }

    /// Use `sensor`'s readings as `system`'s measured value. Returns false if
    /// either handle is unknown.
    pub fn link(&mut self, sensor: SensorId, system: SystemId) -> bool {
        if self.system(system).is_none() {
            return false;
        }
        match self.sensors.get_mut(sensor.0 as usize) {
            Some(s) => {
                s.feeds = Some(system);
                true
            }
            None => false,
        }
    }

    /// Back to controlling on ground truth.
    pub fn unlink(&mut self, sensor: SensorId) {
        let Some(s) = self.sensors.get_mut(sensor.0 as usize) else {
            return;
        };
        let field = s.kind().field();
        if let Some(sys) = s.feeds.take() {
            if let Some(system) = self.system_mut(sys) {
                system.observe(field, None);
            }
        }
    }

    // ── Time and environment ──────────────────────────────────────────

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn hour_of_day(&self) -> f32 {
        self.clock.hour_of_day()
    }

    pub fn day(&self) -> u64 {
        self.clock.day()
    }

    /// Set time scale (1.0 = real-time, 2.0 = 2x speed, etc.)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = sanitize_dt(scale);
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_of_day(&mut self, hour: f32) {
        self.clock.set_hour(hour);
        for slot in &mut self.systems {
            slot.as_dyn_mut().set_time_of_day(hour);
        }
    }

    pub fn ambient(&self) -> EnvironmentSnapshot {
        self.ambient
    }

    /// Supplied by the external environment provider.
    pub fn set_ambient(&mut self, ambient: EnvironmentSnapshot) {
        self.ambient = ambient;
        for slot in &mut self.systems {
            slot.as_dyn_mut().set_ambient(ambient);
        }
    }

    /// Ambient overlaid with every subsystem's governed variables.
    pub fn zone_environment(&self) -> EnvironmentSnapshot {
        let mut env = self.ambient;
        for slot in &self.systems {
            slot.as_dyn().contribute(&mut env);
        }
        env
    }

    fn source_environment(&self, source: SensorSource, zone: &EnvironmentSnapshot) -> EnvironmentSnapshot {
        match source {
            SensorSource::Ambient => self.ambient,
            SensorSource::Zone => *zone,
            SensorSource::System(id) => match self.system(id) {
                Some(system) => {
                    let mut env = self.ambient;
                    system.contribute(&mut env);
                    env
                }
                None => *zone,
            },
        }
    }

    /// Advance every subsystem, then sample every sensor against its bound
    /// source, then feed linked readings back for the next decision.
    pub fn advance(&mut self, delta_seconds: f32) {
        let dt = sanitize_dt(delta_seconds * self.time_scale);
        self.sim_time += dt as f64;
        self.clock.advance(dt);

        for slot in &mut self.systems {
            slot.as_dyn_mut().advance(dt);
        }

        let zone = self.zone_environment();
        let now = self.sim_time;
        let mut feedback = Vec::new();
        for i in 0..self.sensors.len() {
            let truth = self.source_environment(self.sensors[i].source, &zone);
            let sensor = &mut self.sensors[i];
            if let Some(reading) = sensor.advance(dt, &truth, now) {
                // Offline readings are untrusted; the last trusted value stays.
                if let (Some(sys), true) = (sensor.feeds, sensor.is_online()) {
                    feedback.push((sys, sensor.kind().field(), reading.value));
                }
            }
        }
        for (sys, field, value) in feedback {
            if let Some(system) = self.system_mut(sys) {
                system.observe(field, Some(value));
            }
        }
    }

    // ── Subsystems ────────────────────────────────────────────────────

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn system_ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        (0..self.systems.len()).map(|i| SystemId(i as u32))
    }

    pub fn system(&self, id: SystemId) -> Option<&dyn Subsystem> {
        self.systems.get(id.0 as usize).map(SystemSlot::as_dyn)
    }

    pub fn system_mut(&mut self, id: SystemId) -> Option<&mut dyn Subsystem> {
        self.systems.get_mut(id.0 as usize).map(SystemSlot::as_dyn_mut)
    }

    pub fn find_system(&self, name: &str) -> Option<SystemId> {
        self.systems
            .iter()
            .find(|s| s.as_dyn().name() == name)
            .map(|s| s.as_dyn().id())
    }

    pub fn climate(&self, id: SystemId) -> Option<&ClimateSystem> {
        match self.systems.get(id.0 as usize) {
            Some(SystemSlot::Climate(s)) => Some(s),
            _ => None,
        }
    }

    pub fn climate_mut(&mut self, id: SystemId) -> Option<&mut ClimateSystem> {
        match self.systems.get_mut(id.0 as usize) {
            Some(SystemSlot::Climate(s)) => Some(s),
            _ => None,
        }
    }

    pub fn ventilation(&self, id: SystemId) -> Option<&VentilationSystem> {
        match self.systems.get(id.0 as usize) {
            Some(SystemSlot::Ventilation(s)) => Some(s),
            _ => None,
        }
    }

    pub fn ventilation_mut(&mut self, id: SystemId) -> Option<&mut VentilationSystem> {
        match self.systems.get_mut(id.0 as usize) {
            Some(SystemSlot::Ventilation(s)) => Some(s),
            _ => None,
        }
    }

    pub fn irrigation(&self, id: SystemId) -> Option<&IrrigationSystem> {
        match self.systems.get(id.0 as usize) {
            Some(SystemSlot::Irrigation(s)) => Some(s),
            _ => None,
        }
    }

    pub fn irrigation_mut(&mut self, id: SystemId) -> Option<&mut IrrigationSystem> {
        match self.systems.get_mut(id.0 as usize) {
            Some(SystemSlot::Irrigation(s)) => Some(s),
            _ => None,
        }
    }

    pub fn lighting(&self, id: SystemId) -> Option<&LightingSystem> {
        match self.systems.get(id.0 as usize) {
            Some(SystemSlot::Lighting(s)) => Some(s),
            _ => None,
        }
    }

    pub fn lighting_mut(&mut self, id: SystemId) -> Option<&mut LightingSystem> {
        match self.systems.get_mut(id.0 as usize) {
            Some(SystemSlot::Lighting(s)) => Some(s),
            _ => None,
        }
    }

    pub fn start_all(&mut self) {
        for slot in &mut self.systems {
            slot.as_dyn_mut().start();
        }
    }

    pub fn stop_all(&mut self) {
        for slot in &mut self.systems {
            slot.as_dyn_mut().stop();
        }
    }

    pub fn status(&self, id: SystemId) -> Option<SubsystemStatus> {
        self.system(id).map(|s| s.status())
    }

    pub fn status_all(&self) -> Vec<SubsystemStatus> {
        self.systems.iter().map(|s| s.as_dyn().status()).collect()
    }

    // ── Sensors ───────────────────────────────────────────────────────

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(id.0 as usize)
    }

    pub fn sensor_mut(&mut self, id: SensorId) -> Option<&mut Sensor> {
        self.sensors.get_mut(id.0 as usize)
    }

    pub fn find_sensor(&self, name: &str) -> Option<SensorId> {
        self.sensors.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn sensor_snapshot(&self, id: SensorId) -> Option<SensorSnapshot> {
        self.sensor(id).map(Sensor::snapshot)
    }

    pub fn sensor_snapshots(&self) -> Vec<SensorSnapshot> {
        self.sensors.iter().map(Sensor::snapshot).collect()
    }

    // ── Energy ────────────────────────────────────────────────────────

    pub fn total_power_w(&self) -> f32 {
        self.systems.iter().map(|s| s.as_dyn().power_w()).sum()
    }

    pub fn total_energy_kwh(&self) -> f64 {
        self.systems
            .iter()
            .map(|s| s.as_dyn().ledger().energy_kwh)
            .sum()
    }

    /// Administrative reset of every ledger.
    pub fn reset_energy(&mut self) {
        for slot in &mut self.systems {
            slot.as_dyn_mut().reset_energy();
        }
        info!("energy ledgers reset");
    }

    // ── Persistence ───────────────────────────────────────────────────

    /// Save facility state to a writer
    pub fn save<W: std::io::Write>(&self, writer: W) -> Result<(), PersistError> {
        persistence::save_facility(
            writer,
            self.seed,
            self.sim_time,
            self.time_scale,
            self.clock,
            self.ambient,
            &self.systems,
            &self.sensors,
        )
    }

    /// Load facility state from a reader. Subscribers on this facility's bus
    /// keep receiving notifications from the loaded subsystems and sensors.
    pub fn load<R: std::io::Read>(&mut self, reader: R) -> Result<(), PersistError> {
        let LoadedFacility {
            seed,
            sim_time,
            time_scale,
            clock,
            ambient,
            systems,
            sensors,
        } = persistence::load_facility(reader)?;

        self.seed = seed;
        self.sim_time = sim_time;
        self.time_scale = time_scale;
        self.clock = clock;
        self.ambient = ambient;
        self.systems = systems;
        self.sensors = sensors;

        for (i, slot) in self.systems.iter_mut().enumerate() {
            let core = slot.as_dyn_mut().core_mut();
            if core.id.0 as usize != i {
                warn!("save lists {} at slot {}; renumbering", core.id, i);
            }
            core.attach(SystemId(i as u32), self.bus.clone());
        }
        let count = self.systems.len();
        for sensor in &mut self.sensors {
            sensor.rebind_bus(self.bus.clone());
            if let Some(sys) = sensor.feeds {
                if sys.0 as usize >= count {
                    warn!("{} feeds unknown {}; link dropped", sensor.name, sys);
                    sensor.feeds = None;
                }
            }
        }
        info!(
            "loaded facility: {} systems, {} sensors, day {} {:.2}h",
            self.systems.len(),
            self.sensors.len(),
            self.day(),
            self.hour_of_day()
        );
        Ok(())
    }
}

impl Default for Facility {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Notification;
    use verdant_logic::sensing::{SensorProfile, SensorType};

    fn heated_room() -> (Facility, SystemId) {
        let mut facility = Facility::new(7);
        let id = facility.add_system(ClimateSystem::new(
            &ClimateConfig {
                initial_temperature: Some(18.0),
                ..Default::default()
            },
            EnvironmentSnapshot::default(),
        ));
        facility.start_all();
        (facility, id)
    }

    #[test]
    fn test_facility_creation() {
        let facility = Facility::new(1);
        assert_eq!(facility.system_count(), 0);
        assert_eq!(facility.sensor_count(), 0);
        assert_eq!(facility.sim_time(), 0.0);
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let mut facility = Facility::new(1);
        let env = EnvironmentSnapshot::default();
        let a = facility.add_system(ClimateSystem::new(&ClimateConfig::default(), env));
        let b = facility.add_system(LightingSystem::new(&LightingConfig::default(), env));
        assert_eq!(a, SystemId(0));
        assert_eq!(b, SystemId(1));
        assert!(facility.lighting(b).is_some());
        assert!(facility.climate(b).is_none());
        assert_eq!(facility.find_system("lighting"), Some(b));
    }

    #[test]
    fn test_advance_moves_clock_and_systems() {
        let (mut facility, id) = heated_room();
        for _ in 0..60 {
            facility.advance(60.0);
        }
        assert!((facility.sim_time() - 3600.0).abs() < 1e-6);
        assert!((facility.hour_of_day() - 1.0).abs() < 1e-4);
        let climate = facility.climate(id).map(|c| c.temperature()).unwrap_or(0.0);
        assert!(climate > 20.0);
    }

    #[test]
    fn test_non_finite_delta_is_ignored() {
        let (mut facility, id) = heated_room();
        facility.advance(60.0);
        let before = (facility.sim_time(), facility.hour_of_day(), facility.total_energy_kwh());

        facility.advance(f32::INFINITY);
        facility.advance(f32::NEG_INFINITY);
        facility.advance(f32::NAN);
        assert_eq!(
            (facility.sim_time(), facility.hour_of_day(), facility.total_energy_kwh()),
            before
        );

        facility.advance(1.0);
        assert!(facility.hour_of_day().is_finite());
        assert_eq!(facility.day(), 0);
        assert!(facility.total_energy_kwh().is_finite());
        let status = facility.status(id).expect("registered");
        assert!(status.operating_hours.is_finite());
    }

    #[test]
    fn test_time_scale() {
        let mut facility = Facility::new(1);
        facility.set_time_scale(2.0);
        facility.advance(1.0);
        assert!((facility.sim_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zone_sensor_sees_governed_value() {
        let (mut facility, _) = heated_room();
        let probe = facility.add_sensor(
            Sensor::new("probe", SensorType::Temperature, SensorSource::Zone)
                .with_profile(SensorProfile::IDEAL),
        );
        let outside = facility.add_sensor(
            Sensor::new("outside", SensorType::Temperature, SensorSource::Ambient)
                .with_profile(SensorProfile::IDEAL),
        );
        facility.advance(1.0);
        let zone = facility.sensor(probe).and_then(|s| s.latest()).map(|r| r.value);
        let amb = facility.sensor(outside).and_then(|s| s.latest()).map(|r| r.value);
        assert!(zone.is_some_and(|v| v < 19.0));
        assert_eq!(amb, Some(20.0));
    }

    #[test]
    fn test_unknown_source_falls_back_to_zone() {
        let mut facility = Facility::new(1);
        let id = facility.add_sensor(Sensor::new(
            "stray",
            SensorType::Co2,
            SensorSource::System(SystemId(9)),
        ));
        assert_eq!(facility.sensor(id).map(|s| s.source), Some(SensorSource::Zone));
        assert!(!facility.link(id, SystemId(9)));
    }

    #[test]
    fn test_linked_sensor_drives_decision() {
        let (mut facility, id) = heated_room();
        let probe = facility.add_sensor(
            Sensor::new("probe", SensorType::Temperature, SensorSource::System(id))
                .with_profile(SensorProfile::IDEAL),
        );
        assert!(facility.link(probe, id));
        // A sensor reading 30 °C makes the controller cool a room at 18 °C.
        if let Some(s) = facility.sensor_mut(probe) {
            s.set_calibration(12.0, 1.0);
        }
        facility.advance(1.0);
        facility.advance(1.0);
        assert!(facility.climate(id).is_some_and(|c| c.is_cooling()));

        facility.unlink(probe);
        facility.advance(1.0);
        assert!(facility.climate(id).is_some_and(|c| c.is_heating()));
    }

    #[test]
    fn test_reset_energy_zeroes_totals() {
        let (mut facility, _) = heated_room();
        facility.advance(600.0);
        assert!(facility.total_energy_kwh() > 0.0);
        assert!(facility.total_power_w() > 0.0);
        facility.reset_energy();
        assert_eq!(facility.total_energy_kwh(), 0.0);
    }

    #[test]
    fn test_subsystem_notifications_reach_facility_bus() {
        let mut facility = Facility::new(1);
        let rec = facility.bus().recorder();
        facility.add_system(ClimateSystem::new(
            &ClimateConfig::default(),
            EnvironmentSnapshot::default(),
        ));
        facility.start_all();
        assert_eq!(
            rec.count(|n| matches!(n, Notification::StateChanged { .. })),
            1
        );
    }
}
