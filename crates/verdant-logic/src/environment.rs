//! Environment snapshot: the ground-truth values a grow room exposes.
//!
//! The engine never simulates weather. An external provider supplies the
//! ambient snapshot, subsystems overlay the variables they govern, and
//! sensors extract one scalar each from the result.

use serde::{Deserialize, Serialize};

/// Ambient or zone conditions at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSnapshot {
    /// Air temperature in Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Photosynthetic photon flux density (µmol/m²/s).
    pub light: f32,
    /// Carbon dioxide in ppm.
    pub co2: f32,
    /// Air speed in m/s.
    pub airflow: f32,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            temperature: 20.0,
            humidity: 55.0,
            light: 0.0,
            co2: 420.0,
            airflow: 0.1,
        }
    }
}

/// One field of an [`EnvironmentSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvField {
    Temperature,
    Humidity,
    Light,
    Co2,
    Airflow,
}

impl EnvironmentSnapshot {
    pub fn get(&self, field: EnvField) -> f32 {
        match field {
            EnvField::Temperature => self.temperature,
            EnvField::Humidity => self.humidity,
            EnvField::Light => self.light,
            EnvField::Co2 => self.co2,
            EnvField::Airflow => self.airflow,
        }
    }

    pub fn set(&mut self, field: EnvField, value: f32) {
        match field {
            EnvField::Temperature => self.temperature = value,
            EnvField::Humidity => self.humidity = value,
            EnvField::Light => self.light = value,
            EnvField::Co2 => self.co2 = value,
            EnvField::Airflow => self.airflow = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_roundtrip() {
        let mut env = EnvironmentSnapshot::default();
        env.set(EnvField::Co2, 900.0);
        assert_eq!(env.get(EnvField::Co2), 900.0);
        assert_eq!(env.get(EnvField::Temperature), 20.0);
    }

    #[test]
    fn test_default_is_plausible_room() {
        let env = EnvironmentSnapshot::default();
        assert!(env.co2 > 400.0 && env.co2 < 500.0);
        assert!(env.humidity > 0.0 && env.humidity < 100.0);
    }
}
