//! Save/Load functionality for persisting facility state
//!
//! Uses bincode for efficient binary serialization of the whole facility.
//! Subsystems and sensors serialize as plain data; bus handles are rebound by
//! the facility after loading.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use verdant_logic::environment::EnvironmentSnapshot;
use verdant_logic::schedule::SimClock;

use crate::error::PersistError;
use crate::sensor::Sensor;
use crate::systems::SystemSlot;

/// Version number for save file format (increment when format changes)
pub const SAVE_VERSION: u32 = 1;

/// Serializable snapshot of the facility state
#[derive(Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    pub seed: u64,
    /// Simulated seconds since start
    pub sim_time: f64,
    pub time_scale: f32,
    pub clock: SimClock,
    pub ambient: EnvironmentSnapshot,
    /// Subsystems in registration order; the index is the id
    pub systems: Vec<SystemSlot>,
    /// Sensors in registration order, with history and alert slots
    pub sensors: Vec<Sensor>,
}

/// Save the complete facility to a writer
#[allow(clippy::too_many_arguments)]
pub fn save_facility<W: Write>(
    writer: W,
    seed: u64,
    sim_time: f64,
    time_scale: f32,
    clock: SimClock,
    ambient: EnvironmentSnapshot,
    systems: &[SystemSlot],
    sensors: &[Sensor],
) -> Result<(), PersistError> {
    let save_data = SaveData {
        version: SAVE_VERSION,
        seed,
        sim_time,
        time_scale,
        clock,
        ambient,
        systems: systems.to_vec(),
        sensors: sensors.to_vec(),
    };

    bincode::serialize_into(writer, &save_data)?;
    Ok(())
}

/// Load a facility from a reader
pub fn load_facility<R: Read>(reader: R) -> Result<LoadedFacility, PersistError> {
    let save_data: SaveData = bincode::deserialize_from(reader)?;

    if save_data.version != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save_data.version,
        });
    }

    Ok(LoadedFacility {
        seed: save_data.seed,
        sim_time: save_data.sim_time,
        time_scale: save_data.time_scale,
        clock: save_data.clock,
        ambient: save_data.ambient,
        systems: save_data.systems,
        sensors: save_data.sensors,
    })
}

/// Result of loading a facility
pub struct LoadedFacility {
    pub seed: u64,
    pub sim_time: f64,
    pub time_scale: f32,
    pub clock: SimClock,
    pub ambient: EnvironmentSnapshot,
    pub systems: Vec<SystemSlot>,
    pub sensors: Vec<Sensor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Facility;
    use crate::sensor::SensorSource;
    use crate::systems::{ClimateConfig, ClimateSystem, IrrigationConfig, IrrigationSystem};
    use verdant_logic::sensing::SensorType;

    fn populated() -> Facility {
        let mut facility = Facility::new(11);
        let env = EnvironmentSnapshot::default();
        let climate = facility.add_system(ClimateSystem::new(&ClimateConfig::default(), env));
        facility.add_system(IrrigationSystem::new(&IrrigationConfig::default(), env));
        let probe = facility.add_sensor(Sensor::new(
            "canopy",
            SensorType::Temperature,
            SensorSource::System(climate),
        ));
        facility.link(probe, climate);
        facility.start_all();
        facility
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut facility = populated();
        for _ in 0..120 {
            facility.advance(1.0);
        }

        let mut save_buffer = Vec::new();
        facility.save(&mut save_buffer).expect("Save failed");

        let mut loaded = Facility::new(0);
        loaded.load(&save_buffer[..]).expect("Load failed");

        assert_eq!(loaded.seed(), 11);
        assert!((loaded.sim_time() - facility.sim_time()).abs() < 1e-9);
        assert_eq!(loaded.system_count(), 2);
        assert_eq!(loaded.status_all(), facility.status_all());
        assert_eq!(loaded.sensor_snapshots(), facility.sensor_snapshots());
    }

    #[test]
    fn test_loaded_facility_continues_identically() {
        let mut facility = populated();
        for _ in 0..30 {
            facility.advance(1.0);
        }
        let mut buf = Vec::new();
        facility.save(&mut buf).expect("Save failed");
        let mut loaded = Facility::new(0);
        loaded.load(&buf[..]).expect("Load failed");

        for _ in 0..30 {
            facility.advance(1.0);
            loaded.advance(1.0);
        }
        assert_eq!(loaded.sensor_snapshots(), facility.sensor_snapshots());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let facility = populated();
        let mut buf = Vec::new();
        facility.save(&mut buf).expect("Save failed");
        // Version is the leading little-endian u32.
        buf[0] = buf[0].wrapping_add(1);

        let mut loaded = Facility::new(0);
        match loaded.load(&buf[..]) {
            Err(PersistError::VersionMismatch { expected, found }) => {
                assert_eq!(expected, SAVE_VERSION);
                assert_eq!(found, SAVE_VERSION + 1);
            }
            other => panic!("expected version mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_truncated_save_is_an_error() {
        let facility = populated();
        let mut buf = Vec::new();
        facility.save(&mut buf).expect("Save failed");
        buf.truncate(buf.len() / 2);
        let mut loaded = Facility::new(0);
        assert!(loaded.load(&buf[..]).is_err());
    }
}
