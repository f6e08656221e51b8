//! Pure control logic for Verdant.
//!
//! This crate contains the decision and bookkeeping rules of the grow-room
//! simulation, independent of any engine, clock, or random source. Functions
//! take plain data and return results, making them unit-testable and usable
//! from the engine, the headless harness, and any future host.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Setter ranges, drift rates, wattages, cadence defaults |
//! | [`control`] | Setpoint bands and the hysteresis controller (opposed channels) |
//! | [`environment`] | Ambient/zone snapshot consumed by sensors |
//! | [`history`] | Bounded reading history and on-demand analytics |
//! | [`ids`] | Subsystem and sensor handles |
//! | [`ledger`] | Energy, operating hours, cycle counters |
//! | [`rate`] | Rate-of-change model and the generic controlled axis |
//! | [`schedule`] | Time windows with midnight wraparound, gates, photoperiod |
//! | [`sensing`] | Sensor stages (calibration, noise, accuracy, clamp) and alerts |

pub mod constants;
pub mod control;
pub mod environment;
pub mod history;
pub mod ids;
pub mod ledger;
pub mod rate;
pub mod schedule;
pub mod sensing;
