//! Facility configuration - a serde tree loaded from JSON.
//!
//! Every struct is `#[serde(default)]`, so a partial document fills the gaps
//! from defaults. Out-of-range values are clamped by the same setters the
//! manual API uses; nothing is rejected. Subsystems are referenced by name.

use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use verdant_logic::constants::cadence::{
    ALERT_COOLDOWN_SECS, CONNECTIVITY_INTERVAL_SECS, DROP_PROBABILITY, PACKETS_PER_TRANSMISSION,
    PACKET_QUEUE_CAPACITY, RECOVER_PROBABILITY, SAMPLE_INTERVAL_SECS, SCHEDULE_INTERVAL_SECS,
};
use verdant_logic::environment::EnvironmentSnapshot;
use verdant_logic::history::DEFAULT_HISTORY_CAPACITY;
use verdant_logic::ids::SystemId;
use verdant_logic::sensing::{AlertThresholds, Calibration, SensorProfile, SensorType};

use crate::engine::Facility;
use crate::error::ConfigError;
use crate::sensor::{Connectivity, Sensor, SensorSource};
use crate::systems::*;

/// Engine intervals, in simulated seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub schedule_interval_secs: f32,
    pub sample_interval_secs: f32,
    pub connectivity_interval_secs: f32,
    pub alert_cooldown_secs: f32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            schedule_interval_secs: SCHEDULE_INTERVAL_SECS,
            sample_interval_secs: SAMPLE_INTERVAL_SECS,
            connectivity_interval_secs: CONNECTIVITY_INTERVAL_SECS,
            alert_cooldown_secs: ALERT_COOLDOWN_SECS,
        }
    }
}

/// Where a configured sensor reads from. Subsystems are named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    Ambient,
    Zone,
    System(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub name: String,
    pub kind: SensorType,
    pub source: SourceConfig,
    /// Subsystem that uses this sensor as its measured value.
    pub feeds: Option<String>,
    /// Facility cadence when absent.
    pub sample_interval_secs: Option<f32>,
    pub profile: SensorProfile,
    pub calibration: Calibration,
    /// Type defaults when absent.
    pub thresholds: Option<AlertThresholds>,
    /// Facility cadence when absent.
    pub alert_cooldown_secs: Option<f32>,
    pub drop_probability: f32,
    pub recover_probability: f32,
    pub queue_capacity: usize,
    pub packets_per_transmission: usize,
    pub history_capacity: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: "sensor".to_string(),
            kind: SensorType::Temperature,
            source: SourceConfig::Zone,
            feeds: None,
            sample_interval_secs: None,
            profile: SensorProfile::default(),
            calibration: Calibration::default(),
            thresholds: None,
            alert_cooldown_secs: None,
            drop_probability: DROP_PROBABILITY,
            recover_probability: RECOVER_PROBABILITY,
            queue_capacity: PACKET_QUEUE_CAPACITY,
            packets_per_transmission: PACKETS_PER_TRANSMISSION,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    pub seed: u64,
    /// Hour of day the clock starts at.
    pub start_hour: f32,
    pub ambient: EnvironmentSnapshot,
    pub cadence: CadenceConfig,
    /// Start every subsystem once built.
    pub autostart: bool,
    pub climate: Vec<ClimateConfig>,
    pub ventilation: Vec<VentilationConfig>,
    pub irrigation: Vec<IrrigationConfig>,
    pub lighting: Vec<LightingConfig>,
    pub sensors: Vec<SensorConfig>,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            start_hour: 0.0,
            ambient: EnvironmentSnapshot::default(),
            cadence: CadenceConfig::default(),
            autostart: true,
            climate: Vec::new(),
            ventilation: Vec::new(),
            irrigation: Vec::new(),
            lighting: Vec::new(),
            sensors: Vec::new(),
        }
    }
}

impl FacilityConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        info!(
            "loaded facility config {} ({} systems, {} sensors)",
            path.display(),
            config.system_count(),
            config.sensors.len()
        );
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn system_count(&self) -> usize {
        self.climate.len() + self.ventilation.len() + self.irrigation.len() + self.lighting.len()
    }
}

impl Facility {
    /// Build a facility with every subsystem registered and every sensor bound
    /// to its source. Unknown subsystem names degrade with a warning.
    pub fn from_config(config: &FacilityConfig) -> Self {
        let mut facility = Facility::new(config.seed);
        facility.set_ambient(config.ambient);
        facility.set_time_of_day(config.start_hour);

        let ambient = config.ambient;
        let mut ids = Vec::with_capacity(config.system_count());
        for c in &config.climate {
            ids.push(facility.add_system(ClimateSystem::new(c, ambient)));
        }
        for c in &config.ventilation {
            ids.push(facility.add_system(VentilationSystem::new(c, ambient)));
        }
        for c in &config.irrigation {
            ids.push(facility.add_system(IrrigationSystem::new(c, ambient)));
        }
        for c in &config.lighting {
            ids.push(facility.add_system(LightingSystem::new(c, ambient)));
        }
        for id in ids {
            if let Some(system) = facility.system_mut(id) {
                system
                    .core_mut()
                    .set_schedule_interval(config.cadence.schedule_interval_secs);
            }
        }

        for sc in &config.sensors {
            let sensor = build_sensor(&facility, sc, &config.cadence);
            facility.add_sensor(sensor);
        }

        if config.autostart {
            facility.start_all();
        }
        facility
    }
}

fn resolve_system(facility: &Facility, sensor: &str, name: &str) -> Option<SystemId> {
    let id = facility.find_system(name);
    if id.is_none() {
        warn!("{} references unknown subsystem '{}'", sensor, name);
    }
    id
}

fn build_sensor(facility: &Facility, sc: &SensorConfig, cadence: &CadenceConfig) -> Sensor {
    let source = match &sc.source {
        SourceConfig::Ambient => SensorSource::Ambient,
        SourceConfig::Zone => SensorSource::Zone,
        SourceConfig::System(name) => resolve_system(facility, &sc.name, name)
            .map(SensorSource::System)
            .unwrap_or(SensorSource::Zone),
    };

    let mut sensor = Sensor::new(sc.name.clone(), sc.kind, source)
        .with_connectivity(Connectivity::new(
            cadence.connectivity_interval_secs,
            sc.drop_probability,
            sc.recover_probability,
        ))
        .with_history_capacity(sc.history_capacity)
        .with_queue(sc.queue_capacity, sc.packets_per_transmission);
    sensor.set_profile(sc.profile);
    sensor.set_calibration(sc.calibration.offset, sc.calibration.multiplier);
    if let Some(thresholds) = sc.thresholds {
        sensor.set_thresholds(thresholds);
    }
    sensor.set_sample_interval(sc.sample_interval_secs.unwrap_or(cadence.sample_interval_secs));
    sensor.set_alert_cooldown(sc.alert_cooldown_secs.unwrap_or(cadence.alert_cooldown_secs));
    sensor.feeds = sc
        .feeds
        .as_deref()
        .and_then(|name| resolve_system(facility, &sc.name, name));
    sensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_logic::schedule::Schedule;
    use verdant_logic::sensing::Band;

    const SMALL: &str = r#"{
        "seed": 5,
        "start_hour": 8.0,
        "climate": [{ "name": "hvac", "target_temperature": 24.0 }],
        "lighting": [{ "name": "lamps" }],
        "sensors": [
            { "name": "air", "kind": "Temperature", "source": { "system": "hvac" }, "feeds": "hvac" },
            { "name": "par", "kind": "Light", "source": "zone" }
        ]
    }"#;

    #[test]
    fn test_partial_document_fills_defaults() {
        let config = FacilityConfig::from_json_str(SMALL).expect("parse");
        assert_eq!(config.seed, 5);
        assert_eq!(config.climate[0].temperature_tolerance, 1.0);
        assert_eq!(config.cadence, CadenceConfig::default());
        assert_eq!(config.sensors[1].source, SourceConfig::Zone);
        assert!(config.autostart);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = FacilityConfig::from_json_str(SMALL).expect("parse");
        config.irrigation.push(IrrigationConfig {
            schedule: Some(Schedule::new().with_entry(22.0, 2.0, 8.0)),
            ..Default::default()
        });
        config.sensors[0].calibration = Calibration::new(-0.5, 1.02);
        let json = config.to_json().expect("serialize");
        let back = FacilityConfig::from_json_str(&json).expect("reparse");
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = FacilityConfig::from_json_str("{ \"seed\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = FacilityConfig::load("/nonexistent/verdant/facility.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_config_builds_and_links() {
        let config = FacilityConfig::from_json_str(SMALL).expect("parse");
        let facility = Facility::from_config(&config);
        assert_eq!(facility.system_count(), 2);
        assert_eq!(facility.sensor_count(), 2);
        assert!((facility.hour_of_day() - 8.0).abs() < 1e-4);

        let hvac = facility.find_system("hvac");
        let air = facility.find_sensor("air").and_then(|id| facility.sensor(id));
        assert!(air.is_some_and(|s| s.feeds == hvac && s.source == SensorSource::System(SystemId(0))));
        assert!(facility.status_all().iter().all(|s| s.operational));
        let target = hvac
            .and_then(|id| facility.climate(id))
            .map(|c| c.temperature_setpoint().target);
        assert_eq!(target, Some(24.0));
    }

    #[test]
    fn test_unknown_names_degrade() {
        let config = FacilityConfig {
            sensors: vec![SensorConfig {
                name: "lost".into(),
                source: SourceConfig::System("nowhere".into()),
                feeds: Some("nowhere".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let facility = Facility::from_config(&config);
        let lost = facility.sensor(verdant_logic::ids::SensorId(0));
        assert!(lost.is_some_and(|s| s.source == SensorSource::Zone && s.feeds.is_none()));
    }

    #[test]
    fn test_loaded_bands_and_windows_are_normalized() {
        let json = r#"{
            "climate": [{
                "schedule": { "entries": [{ "start_hour": 46.0, "end_hour": -18.0, "parameter": 18.0 }] }
            }],
            "sensors": [{
                "name": "air",
                "kind": "Temperature",
                "thresholds": {
                    "warning": { "low": 28.0, "high": 18.0 },
                    "critical": { "low": 35.0, "high": 10.0 }
                }
            }]
        }"#;
        let config = FacilityConfig::from_json_str(json).expect("parse");
        let entry = config.climate[0]
            .schedule
            .as_ref()
            .map(|s| s.entries[0])
            .expect("entry");
        assert!((entry.start_hour - 22.0).abs() < 1e-4);
        assert!((entry.end_hour - 6.0).abs() < 1e-4);
        assert!(entry.contains(23.0));

        let thresholds = config.sensors[0].thresholds.expect("thresholds");
        assert_eq!(thresholds.warning, Band::new(18.0, 28.0));
        assert_eq!(thresholds.critical, Band::new(10.0, 35.0));
        assert!(thresholds.classify(23.0).is_none());
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let config = FacilityConfig {
            climate: vec![ClimateConfig {
                target_temperature: 80.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let facility = Facility::from_config(&config);
        let target = facility
            .climate(SystemId(0))
            .map(|c| c.temperature_setpoint().target);
        assert_eq!(target, Some(35.0));
    }
}
