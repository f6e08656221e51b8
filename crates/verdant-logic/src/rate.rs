//! Rate-of-change model and the generic controlled axis.
//!
//! While a channel runs, the governed variable moves toward the physical
//! extreme on that side at `capacity × efficiency × gain` units per second.
//! While idle, it relaxes toward the ambient baseline with a slower
//! exponential drift. Lighting uses the instant model: no inertia, the value
//! snaps on the same tick the decision is made.

use serde::{Deserialize, Serialize};

use crate::control::{ChannelSet, ChannelState, HysteresisController, Setpoint, Transitions};

/// Move `value` toward `target` by at most `max_step`, never overshooting.
pub fn approach(value: f32, target: f32, max_step: f32) -> f32 {
    let diff = target - value;
    if diff.abs() <= max_step {
        target
    } else {
        value + diff.signum() * max_step
    }
}

/// Exponential relaxation toward `ambient`, step-size independent.
pub fn passive_drift(value: f32, ambient: f32, coefficient: f32, dt_secs: f32) -> f32 {
    let k = 1.0 - (-coefficient.max(0.0) * dt_secs).exp();
    value + (ambient - value) * k
}

/// Elapsed time as the simulation accepts it: NaN, infinite and negative
/// deltas all count as no time passing.
pub fn sanitize_dt(dt_secs: f32) -> f32 {
    if dt_secs.is_finite() {
        dt_secs.max(0.0)
    } else {
        0.0
    }
}

/// Active rate in units/second from rated capacity and efficiency.
pub fn active_rate(capacity: f32, efficiency: f32, gain: f32) -> f32 {
    capacity.max(0.0) * efficiency.clamp(0.0, 1.0) * gain
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateModel {
    /// Bounded linear drive plus passive drift.
    Linear,
    /// No inertia: active snaps to target, idle snaps to ambient.
    Instant,
}

/// Physical constants for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDynamics {
    pub floor: f32,
    pub ceiling: f32,
    /// Passive relaxation coefficient (1/s).
    pub passive_drift: f32,
    pub model: RateModel,
}

impl AxisDynamics {
    pub fn linear(floor: f32, ceiling: f32, passive_drift: f32) -> Self {
        Self {
            floor,
            ceiling,
            passive_drift,
            model: RateModel::Linear,
        }
    }

    pub fn instant(floor: f32, ceiling: f32) -> Self {
        Self {
            floor,
            ceiling,
            passive_drift: 0.0,
            model: RateModel::Instant,
        }
    }
}

/// One governed variable: value, controller, and how it moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlledAxis {
    pub current: f32,
    pub controller: HysteresisController,
    pub dynamics: AxisDynamics,
    /// Units/second while the raise channel runs at full drive.
    pub raise_rate: f32,
    /// Units/second while the lower channel runs at full drive.
    pub lower_rate: f32,
    /// Externally measured value (a sensor), used for decisions when present.
    measured: Option<f32>,
}

impl ControlledAxis {
    pub fn new(
        current: f32,
        setpoint: Setpoint,
        channels: ChannelSet,
        dynamics: AxisDynamics,
    ) -> Self {
        Self {
            current,
            controller: HysteresisController::new(setpoint, channels),
            dynamics,
            raise_rate: 0.0,
            lower_rate: 0.0,
            measured: None,
        }
    }

    pub fn with_rates(mut self, raise_rate: f32, lower_rate: f32) -> Self {
        self.raise_rate = raise_rate.max(0.0);
        self.lower_rate = lower_rate.max(0.0);
        self
    }

    pub fn setpoint(&self) -> Setpoint {
        self.controller.setpoint
    }

    pub fn channels(&self) -> ChannelState {
        self.controller.state()
    }

    /// Value the controller decides on: the last observation, else ground truth.
    pub fn measured(&self) -> f32 {
        self.measured.unwrap_or(self.current)
    }

    pub fn observe(&mut self, value: Option<f32>) {
        self.measured = value;
    }

    pub fn within_band(&self) -> bool {
        self.setpoint().contains(self.measured())
    }

    /// Automated decision against the measured value.
    pub fn decide(&mut self) -> Transitions {
        let value = self.measured();
        self.controller.evaluate(value)
    }

    /// Advance the physical value by `dt_secs`. `drive` scales the active rate
    /// (fan intensity, pump duty); 1.0 is full output.
    pub fn step(&mut self, dt_secs: f32, ambient: f32, drive: f32) {
        let dt_secs = sanitize_dt(dt_secs);
        if dt_secs == 0.0 {
            return;
        }
        let state = self.controller.state();
        let drive = drive.clamp(0.0, 1.0);
        self.current = match self.dynamics.model {
            RateModel::Linear => {
                if state.raise {
                    approach(
                        self.current,
                        self.dynamics.ceiling,
                        self.raise_rate * drive * dt_secs,
                    )
                } else if state.lower {
                    approach(
                        self.current,
                        self.dynamics.floor,
                        self.lower_rate * drive * dt_secs,
                    )
                } else {
                    passive_drift(self.current, ambient, self.dynamics.passive_drift, dt_secs)
                }
            }
            RateModel::Instant => {
                if state.any() {
                    self.controller.setpoint.target
                } else {
                    ambient
                }
            }
        }
        .clamp(self.dynamics.floor, self.dynamics.ceiling);
    }
}
