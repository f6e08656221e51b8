//! Shared subsystem plumbing: lifecycle, schedule gate, ledger, status DTOs

use log::{debug, info};
use serde::{Deserialize, Serialize};
use verdant_logic::control::{Direction, Edge, Transitions};
use verdant_logic::environment::{EnvField, EnvironmentSnapshot};
use verdant_logic::ids::SystemId;
use verdant_logic::ledger::EnergyLedger;
use verdant_logic::rate::sanitize_dt;
use verdant_logic::schedule::{GateChange, Schedule, ScheduleFallback, ScheduleGate, SimClock};

use crate::events::{Channel, Notification, NotificationBus, StateChange};

use super::{ClimateSystem, IrrigationSystem, LightingSystem, VentilationSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubsystemKind {
    Climate,
    Ventilation,
    Irrigation,
    Lighting,
}

/// State every subsystem carries regardless of what it actuates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCore {
    pub id: SystemId,
    pub name: String,
    operational: bool,
    automated: bool,
    pub ledger: EnergyLedger,
    schedule: Option<Schedule>,
    gate: ScheduleGate,
    pub clock: SimClock,
    pub ambient: EnvironmentSnapshot,
    #[serde(skip)]
    bus: NotificationBus,
}

impl SystemCore {
    /// Constructed stopped and automated.
    pub fn new(name: impl Into<String>, ambient: EnvironmentSnapshot) -> Self {
        Self {
            id: SystemId(0),
            name: name.into(),
            operational: false,
            automated: true,
            ledger: EnergyLedger::default(),
            schedule: None,
            gate: ScheduleGate::default(),
            clock: SimClock::default(),
            ambient,
            bus: NotificationBus::default(),
        }
    }

    pub fn attach(&mut self, id: SystemId, bus: NotificationBus) {
        self.id = id;
        self.bus = bus;
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn publish(&self, notification: Notification) {
        self.bus.publish(notification);
    }

    pub fn emit(&self, change: StateChange) {
        self.bus.publish(Notification::StateChanged {
            system: self.id,
            change,
        });
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    pub fn is_automated(&self) -> bool {
        self.automated
    }

    /// Operational and under automatic control.
    pub fn is_driving(&self) -> bool {
        self.operational && self.automated
    }

    /// Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.operational {
            return false;
        }
        self.operational = true;
        self.reset_gate();
        info!("{} ({}) started", self.name, self.id);
        self.emit(StateChange::Started);
        true
    }

    /// Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.operational {
            return false;
        }
        self.operational = false;
        self.reset_gate();
        info!("{} ({}) stopped", self.name, self.id);
        self.emit(StateChange::Stopped);
        true
    }

    pub fn set_automated(&mut self, automated: bool) -> bool {
        if self.automated == automated {
            return false;
        }
        self.automated = automated;
        self.reset_gate();
        debug!("{} automation {}", self.name, if automated { "on" } else { "off" });
        self.emit(StateChange::AutomationChanged { automated });
        true
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn set_schedule(&mut self, schedule: Option<Schedule>) {
        self.schedule = schedule;
        self.gate.invalidate();
    }

    /// Re-evaluate the schedule on the next tick.
    pub fn refresh_schedule(&mut self) {
        self.gate.invalidate();
    }

    pub fn set_schedule_interval(&mut self, secs: f32) {
        self.gate.interval_secs = secs.max(0.0);
    }

    fn reset_gate(&mut self) {
        self.gate = ScheduleGate::new(self.gate.interval_secs);
    }

    pub fn schedule_open(&self) -> bool {
        self.gate.is_open()
    }

    pub fn schedule_parameter(&self) -> f32 {
        self.gate.parameter()
    }

    /// Sanitize the delta and move the clock. Negative or NaN becomes 0.
    pub fn tick(&mut self, dt_secs: f32) -> f32 {
        let dt = sanitize_dt(dt_secs);
        self.clock.advance(dt);
        dt
    }

    pub fn poll_schedule(&mut self, dt_secs: f32, fallback: ScheduleFallback) -> GateChange {
        let hour = self.clock.hour_of_day();
        let change = self
            .gate
            .advance(dt_secs, hour, self.schedule.as_ref(), fallback);
        match change {
            GateChange::Opened(parameter) | GateChange::Retuned(parameter) => {
                debug!("{} schedule window at {:.2}h, parameter {}", self.name, hour, parameter);
                self.emit(StateChange::ScheduleEntered { parameter });
            }
            GateChange::Closed => {
                debug!("{} schedule window closed at {:.2}h", self.name, hour);
                self.emit(StateChange::ScheduleLeft);
            }
            GateChange::Unchanged => {}
        }
        change
    }

    /// Publish channel edges. Automated activations count as cycles.
    pub fn announce(&mut self, t: Transitions, raise: Channel, lower: Channel, automated: bool) {
        if automated {
            self.ledger.record_cycles(t.activations());
        }
        for (dir, edge) in t.changed() {
            let channel = match dir {
                Direction::Raise => raise,
                Direction::Lower => lower,
            };
            let on = edge == Edge::Activated;
            debug!("{} {:?} {}", self.name, channel, if on { "on" } else { "off" });
            self.emit(StateChange::ChannelToggled { channel, on });
        }
    }

    pub fn announce_channel(&mut self, channel: Channel, on: bool, automated: bool) {
        if automated && on {
            self.ledger.record_cycles(1);
        }
        debug!("{} {:?} {}", self.name, channel, if on { "on" } else { "off" });
        self.emit(StateChange::ChannelToggled { channel, on });
    }

    pub fn book(&mut self, power_w: f32, dt_secs: f32) {
        self.ledger.accumulate(power_w, dt_secs, self.operational);
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// The quantity an axis governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    Temperature,
    Humidity,
    Co2,
    Moisture,
    LightIntensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisStatus {
    pub quantity: Quantity,
    pub current: f32,
    pub target: f32,
    pub tolerance: f32,
    pub within_band: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub channel: Channel,
    pub active: bool,
    /// Drive level in `[0, 1]`: fan intensity, lamp intensity, or 1 for on/off loads.
    pub level: f32,
}

impl ChannelStatus {
    pub fn switch(channel: Channel, active: bool) -> Self {
        Self {
            channel,
            active,
            level: if active { 1.0 } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusDetail {
    None,
    Ventilation {
        fan_intensity: f32,
        airflow: f32,
        purging: bool,
    },
    Irrigation {
        tank_litres: f32,
        tank_capacity: f32,
        nutrient_ml: f32,
        nutrient_capacity_ml: f32,
        exhausted: bool,
        run: Option<RunStatus>,
    },
    Lighting {
        spectrum: super::Spectrum,
        ppfd: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub elapsed_secs: f32,
    pub duration_secs: Option<f32>,
    pub delivered_litres: f32,
    pub pulses: u32,
}

/// Read-only snapshot. Building one never mutates the subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemStatus {
    pub id: SystemId,
    pub kind: SubsystemKind,
    pub name: String,
    pub operational: bool,
    pub automated: bool,
    pub schedule_active: bool,
    pub axes: Vec<AxisStatus>,
    pub channels: Vec<ChannelStatus>,
    pub power_w: f32,
    pub energy_kwh: f64,
    pub operating_hours: f64,
    pub cycles: u64,
    pub detail: StatusDetail,
}

impl SubsystemStatus {
    pub(crate) fn base(core: &SystemCore, kind: SubsystemKind, power_w: f32) -> Self {
        Self {
            id: core.id,
            kind,
            name: core.name.clone(),
            operational: core.is_operational(),
            automated: core.is_automated(),
            schedule_active: core.schedule_open(),
            axes: Vec::new(),
            channels: Vec::new(),
            power_w,
            energy_kwh: core.ledger.energy_kwh,
            operating_hours: core.ledger.operating_hours,
            cycles: core.ledger.cycles,
            detail: StatusDetail::None,
        }
    }

    pub fn channel(&self, channel: Channel) -> Option<&ChannelStatus> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    pub fn axis(&self, quantity: Quantity) -> Option<&AxisStatus> {
        self.axes.iter().find(|a| a.quantity == quantity)
    }
}

// ============================================================================
// SUBSYSTEM TRAIT
// ============================================================================

/// The per-instance API the host loop drives.
pub trait Subsystem {
    fn core(&self) -> &SystemCore;
    fn core_mut(&mut self) -> &mut SystemCore;
    fn kind(&self) -> SubsystemKind;

    /// Advance by `dt_secs` of simulated time. The only call required to keep
    /// state current.
    fn advance(&mut self, dt_secs: f32);

    /// Idempotent.
    fn start(&mut self) {
        self.core_mut().start();
    }

    /// Idempotent. Switches every channel off.
    fn stop(&mut self);

    fn set_automated(&mut self, automated: bool) {
        self.core_mut().set_automated(automated);
    }

    /// Feed a measured value (from a linked sensor) for the given field.
    fn observe(&mut self, _field: EnvField, _value: Option<f32>) {}

    /// Overlay governed variables onto a zone snapshot.
    fn contribute(&self, _env: &mut EnvironmentSnapshot) {}

    /// Instantaneous draw in watts.
    fn power_w(&self) -> f32;

    fn status(&self) -> SubsystemStatus;

    fn id(&self) -> SystemId {
        self.core().id
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn is_operational(&self) -> bool {
        self.core().is_operational()
    }

    fn is_automated(&self) -> bool {
        self.core().is_automated()
    }

    fn ledger(&self) -> &EnergyLedger {
        &self.core().ledger
    }

    fn reset_energy(&mut self) {
        self.core_mut().ledger.reset();
    }

    fn set_ambient(&mut self, ambient: EnvironmentSnapshot) {
        self.core_mut().ambient = ambient;
    }

    /// Jumping the clock forces a schedule re-check on the next tick.
    fn set_time_of_day(&mut self, hour: f32) {
        let core = self.core_mut();
        core.clock.set_hour(hour);
        core.refresh_schedule();
    }

    fn set_schedule(&mut self, schedule: Option<Schedule>) {
        self.core_mut().set_schedule(schedule);
    }
}

/// A registered subsystem of any kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemSlot {
    Climate(ClimateSystem),
    Ventilation(VentilationSystem),
    Irrigation(IrrigationSystem),
    Lighting(LightingSystem),
}

impl SystemSlot {
    pub fn as_dyn(&self) -> &dyn Subsystem {
        match self {
            SystemSlot::Climate(s) => s,
            SystemSlot::Ventilation(s) => s,
            SystemSlot::Irrigation(s) => s,
            SystemSlot::Lighting(s) => s,
        }
    }

    pub fn as_dyn_mut(&mut self) -> &mut dyn Subsystem {
        match self {
            SystemSlot::Climate(s) => s,
            SystemSlot::Ventilation(s) => s,
            SystemSlot::Irrigation(s) => s,
            SystemSlot::Lighting(s) => s,
        }
    }
}

impl From<ClimateSystem> for SystemSlot {
    fn from(s: ClimateSystem) -> Self {
        SystemSlot::Climate(s)
    }
}

impl From<VentilationSystem> for SystemSlot {
    fn from(s: VentilationSystem) -> Self {
        SystemSlot::Ventilation(s)
    }
}

impl From<IrrigationSystem> for SystemSlot {
    fn from(s: IrrigationSystem) -> Self {
        SystemSlot::Irrigation(s)
    }
}

impl From<LightingSystem> for SystemSlot {
    fn from(s: LightingSystem) -> Self {
        SystemSlot::Lighting(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_idempotent() {
        let mut core = SystemCore::new("test", EnvironmentSnapshot::default());
        let rec = core.bus().recorder();
        assert!(core.start());
        assert!(!core.start());
        assert!(core.stop());
        assert!(!core.stop());
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn test_tick_sanitizes_delta() {
        let mut core = SystemCore::new("test", EnvironmentSnapshot::default());
        assert_eq!(core.tick(-5.0), 0.0);
        assert_eq!(core.tick(f32::NAN), 0.0);
        assert_eq!(core.tick(2.0), 2.0);
        assert!((core.clock.elapsed_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_book_only_counts_hours_while_operational() {
        let mut core = SystemCore::new("test", EnvironmentSnapshot::default());
        core.book(100.0, 3600.0);
        assert_eq!(core.ledger.operating_hours, 0.0);
        core.start();
        core.book(100.0, 3600.0);
        assert!((core.ledger.operating_hours - 1.0).abs() < 1e-9);
    }
}
