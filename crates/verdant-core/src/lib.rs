//! Verdant Core - Grow Facility Simulation Engine
//!
//! A tick-driven simulation of an automated indoor grow room: actuator
//! subsystems hold their targets against a drifting environment while a
//! network of noisy sensors closes the feedback loop.
//!
//! # Architecture
//!
//! - **Subsystems**: climate, ventilation, irrigation and lighting, each an
//!   owned state object advanced by elapsed time (`Subsystem::advance`)
//! - **Sensors**: explicitly bound to a data source, sampled on an interval,
//!   optionally feeding one subsystem's controller
//! - **Bus**: synchronous notifications delivered after each state change
//! - **Facility**: owns all of the above and drives them in lockstep
//!
//! Pure decision rules live in `verdant-logic`; this crate adds state,
//! randomness, notifications, configuration and persistence.
//!
//! # Example
//!
//! ```rust,no_run
//! use verdant_core::prelude::*;
//!
//! let config = FacilityConfig::load("facility.json").expect("config");
//! let mut facility = Facility::from_config(&config);
//! let alerts = facility.bus().recorder();
//!
//! loop {
//!     facility.advance(1.0);
//!     if !alerts.is_empty() {
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod persistence;
pub mod sensor;
pub mod systems;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::config::{FacilityConfig, SensorConfig, SourceConfig};
    pub use crate::engine::Facility;
    pub use crate::error::{ConfigError, PersistError};
    pub use crate::events::{Channel, Notification, NotificationBus, Resource, RunEnd, StateChange};
    pub use crate::sensor::{Connectivity, Sensor, SensorSnapshot, SensorSource};
    pub use crate::systems::*;
    pub use verdant_logic::environment::EnvironmentSnapshot;
    pub use verdant_logic::ids::{SensorId, SystemId};
    pub use verdant_logic::schedule::{Photoperiod, Schedule};
    pub use verdant_logic::sensing::{SensorProfile, SensorType};
}
