//! Actuator subsystems - climate, ventilation, irrigation, lighting
//!
//! Each subsystem owns its setpoints, channels and energy ledger, and is
//! advanced by the host once per frame. All four share [`SystemCore`] for
//! lifecycle, scheduling and bookkeeping, and differ only in physics.

mod common;
mod climate;
mod ventilation;
mod irrigation;
mod lighting;

pub use common::*;
pub use climate::*;
pub use ventilation::*;
pub use irrigation::*;
pub use lighting::*;
