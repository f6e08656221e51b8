//! Time-window schedules: when automation may act, and with what parameter.
//!
//! Hours are `f32` hour-of-day in `[0, 24)`. A window with `start > end` wraps
//! past midnight. Entries are checked in stored order and the first match
//! wins. Schedules are plain configuration and are never mutated while being
//! evaluated.

use serde::{Deserialize, Serialize};

use crate::constants::cadence;
use crate::rate::sanitize_dt;

/// Normalize any hour value into `[0, 24)`. NaN maps to midnight.
pub fn normalize_hour(hour: f32) -> f32 {
    if hour.is_nan() {
        return 0.0;
    }
    let h = hour.rem_euclid(24.0);
    // rem_euclid can round up to exactly 24.0 for tiny negatives
    if h >= 24.0 {
        0.0
    } else {
        h
    }
}

/// Window membership with midnight wraparound. Start inclusive, end exclusive.
/// A zero-length window (`start == end`) never matches.
pub fn in_window(hour: f32, start: f32, end: f32) -> bool {
    let hour = normalize_hour(hour);
    if start < end {
        (start..end).contains(&hour)
    } else if start > end {
        // Wraps midnight
        !(end..start).contains(&hour)
    } else {
        false
    }
}

/// One automation window. Hours are wrapped into `[0, 24)` on every load path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawScheduleEntry")]
pub struct ScheduleEntry {
    pub start_hour: f32,
    pub end_hour: f32,
    /// Subsystem-specific: flow rate, lamp intensity, fan intensity, setback target.
    #[serde(default)]
    pub parameter: f32,
}

#[derive(Deserialize)]
struct RawScheduleEntry {
    start_hour: f32,
    end_hour: f32,
    #[serde(default)]
    parameter: f32,
}

impl From<RawScheduleEntry> for ScheduleEntry {
    fn from(raw: RawScheduleEntry) -> Self {
        Self::new(raw.start_hour, raw.end_hour, raw.parameter)
    }
}

impl ScheduleEntry {
    pub fn new(start_hour: f32, end_hour: f32, parameter: f32) -> Self {
        Self {
            start_hour: normalize_hour(start_hour),
            end_hour: normalize_hour(end_hour),
            parameter,
        }
    }

    pub fn contains(&self, hour: f32) -> bool {
        in_window(hour, self.start_hour, self.end_hour)
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start_hour > self.end_hour
    }

    /// Window length in hours.
    pub fn duration_hours(&self) -> f32 {
        if self.wraps_midnight() {
            24.0 - self.start_hour + self.end_hour
        } else {
            self.end_hour - self.start_hour
        }
    }
}

/// Ordered list of windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, start_hour: f32, end_hour: f32, parameter: f32) -> Self {
        self.entries
            .push(ScheduleEntry::new(start_hour, end_hour, parameter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry containing `hour`, in stored order.
    pub fn first_match(&self, hour: f32) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.contains(hour))
    }
}

/// Whether any window of `schedule` contains `hour`. Missing schedule → inactive.
pub fn is_active(hour: f32, schedule: Option<&Schedule>) -> bool {
    schedule.and_then(|s| s.first_match(hour)).is_some()
}

/// Parameter of the first matching window, or 0 when nothing matches.
pub fn parameter_at(hour: f32, schedule: Option<&Schedule>) -> f32 {
    schedule
        .and_then(|s| s.first_match(hour))
        .map(|e| e.parameter)
        .unwrap_or(0.0)
}

/// Fixed daily light period, the lighting fallback when no schedule is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Photoperiod {
    pub start_hour: f32,
    pub hours: f32,
}

impl Default for Photoperiod {
    fn default() -> Self {
        use crate::constants::lighting;
        Self {
            start_hour: lighting::DEFAULT_PHOTOPERIOD_START,
            hours: lighting::DEFAULT_PHOTOPERIOD_HOURS,
        }
    }
}

impl Photoperiod {
    pub fn new(start_hour: f32, hours: f32) -> Self {
        Self {
            start_hour: normalize_hour(start_hour),
            hours: hours.clamp(0.0, 24.0),
        }
    }

    pub fn end_hour(&self) -> f32 {
        normalize_hour(self.start_hour + self.hours)
    }

    pub fn is_lit(&self, hour: f32) -> bool {
        if self.hours >= 24.0 {
            return true;
        }
        in_window(hour, self.start_hour, self.end_hour())
    }
}

/// What a subsystem does when it has no schedule (or an empty one).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScheduleFallback {
    /// Never active.
    Inactive,
    /// Lit during the photoperiod, parameter 0 (meaning "use the target").
    Photoperiod(Photoperiod),
}

/// Resolve the active window parameter at `hour`, applying the fallback when
/// the schedule is missing or empty. `None` means inactive.
pub fn resolve(hour: f32, schedule: Option<&Schedule>, fallback: ScheduleFallback) -> Option<f32> {
    match schedule.filter(|s| !s.is_empty()) {
        Some(s) => s.first_match(hour).map(|e| e.parameter),
        None => match fallback {
            ScheduleFallback::Inactive => None,
            ScheduleFallback::Photoperiod(p) => p.is_lit(hour).then_some(0.0),
        },
    }
}

/// Result of a gate re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateChange {
    Unchanged,
    Opened(f32),
    Closed,
    /// Still open, but a different window (or parameter) now applies.
    Retuned(f32),
}

/// Re-evaluates a schedule on a fixed interval of accumulated time rather than
/// every tick. The first advance always evaluates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleGate {
    pub interval_secs: f32,
    since_check: f32,
    open: bool,
    parameter: f32,
    primed: bool,
}

impl Default for ScheduleGate {
    fn default() -> Self {
        Self::new(cadence::SCHEDULE_INTERVAL_SECS)
    }
}

impl ScheduleGate {
    pub fn new(interval_secs: f32) -> Self {
        Self {
            interval_secs: interval_secs.max(0.0),
            since_check: 0.0,
            open: false,
            parameter: 0.0,
            primed: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn parameter(&self) -> f32 {
        self.parameter
    }

    /// Force the next `advance` to re-evaluate (after a schedule edit).
    pub fn invalidate(&mut self) {
        self.primed = false;
    }

    pub fn advance(
        &mut self,
        dt_secs: f32,
        hour: f32,
        schedule: Option<&Schedule>,
        fallback: ScheduleFallback,
    ) -> GateChange {
        self.since_check += sanitize_dt(dt_secs);
        if self.primed && self.since_check < self.interval_secs {
            return GateChange::Unchanged;
        }
        self.primed = true;
        self.since_check = 0.0;

        let resolved = resolve(hour, schedule, fallback);
        let change = match (self.open, resolved) {
            (false, Some(p)) => GateChange::Opened(p),
            (true, None) => GateChange::Closed,
            (true, Some(p)) if p != self.parameter => GateChange::Retuned(p),
            _ => GateChange::Unchanged,
        };
        self.open = resolved.is_some();
        self.parameter = resolved.unwrap_or(0.0);
        change
    }
}

/// Simulated time of day, advanced by elapsed seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    /// Seconds since the clock started (day 0, 00:00).
    pub elapsed_secs: f64,
}

impl SimClock {
    pub fn at_hour(hour: f32) -> Self {
        Self {
            elapsed_secs: normalize_hour(hour) as f64 * 3600.0,
        }
    }

    pub fn advance(&mut self, dt_secs: f32) {
        self.elapsed_secs += sanitize_dt(dt_secs) as f64;
    }

    pub fn hour_of_day(&self) -> f32 {
        ((self.elapsed_secs % cadence::SECONDS_PER_DAY) / 3600.0) as f32
    }

    pub fn day(&self) -> u64 {
        (self.elapsed_secs / cadence::SECONDS_PER_DAY) as u64
    }

    /// Jump to `hour` on the current day.
    pub fn set_hour(&mut self, hour: f32) {
        let day_start = self.day() as f64 * cadence::SECONDS_PER_DAY;
        self.elapsed_secs = day_start + normalize_hour(hour) as f64 * 3600.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overnight_window() {
        let e = ScheduleEntry::new(22.0, 2.0, 1.0);
        assert!(e.contains(23.5));
        assert!(e.contains(1.0));
        assert!(e.contains(0.0));
        assert!(!e.contains(12.0));
        assert!(!e.contains(2.0));
        assert!(e.contains(22.0));
        assert!((e.duration_hours() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_daytime_window() {
        assert!(in_window(8.0, 6.0, 14.0));
        assert!(!in_window(14.0, 6.0, 14.0));
        assert!(!in_window(5.99, 6.0, 14.0));
    }

    #[test]
    fn test_zero_length_window_never_matches() {
        for h in 0..24 {
            assert!(!in_window(h as f32, 6.0, 6.0));
        }
    }

    #[test]
    fn test_first_match_wins() {
        let s = Schedule::new()
            .with_entry(6.0, 12.0, 5.0)
            .with_entry(8.0, 10.0, 9.0);
        assert_eq!(parameter_at(9.0, Some(&s)), 5.0);
        assert_eq!(parameter_at(13.0, Some(&s)), 0.0);
    }

    #[test]
    fn test_missing_schedule_is_inactive() {
        assert!(!is_active(12.0, None));
        assert_eq!(parameter_at(12.0, None), 0.0);
        assert!(!is_active(12.0, Some(&Schedule::new())));
    }

    #[test]
    fn test_normalize_hour() {
        assert_eq!(normalize_hour(25.0), 1.0);
        assert_eq!(normalize_hour(-1.0), 23.0);
        assert_eq!(normalize_hour(f32::NAN), 0.0);
    }

    #[test]
    fn test_photoperiod_fallback() {
        let p = Photoperiod::new(6.0, 16.0);
        assert!(p.is_lit(6.0));
        assert!(p.is_lit(21.9));
        assert!(!p.is_lit(22.0));
        assert!(!p.is_lit(3.0));
        let fb = ScheduleFallback::Photoperiod(p);
        assert_eq!(resolve(12.0, None, fb), Some(0.0));
        assert_eq!(resolve(23.0, Some(&Schedule::new()), fb), None);
        assert_eq!(resolve(12.0, None, ScheduleFallback::Inactive), None);
    }

    #[test]
    fn test_photoperiod_overnight() {
        let p = Photoperiod::new(18.0, 12.0);
        assert!(p.is_lit(23.0));
        assert!(p.is_lit(5.0));
        assert!(!p.is_lit(7.0));
    }

    #[test]
    fn test_gate_interval_and_transitions() {
        let s = Schedule::new().with_entry(8.0, 9.0, 3.0);
        let mut gate = ScheduleGate::new(10.0);

        // First call evaluates immediately.
        assert_eq!(
            gate.advance(1.0, 7.0, Some(&s), ScheduleFallback::Inactive),
            GateChange::Unchanged
        );
        // Inside the window, but the interval has not elapsed yet.
        assert_eq!(
            gate.advance(5.0, 8.5, Some(&s), ScheduleFallback::Inactive),
            GateChange::Unchanged
        );
        assert_eq!(
            gate.advance(5.0, 8.5, Some(&s), ScheduleFallback::Inactive),
            GateChange::Opened(3.0)
        );
        assert!(gate.is_open());
        assert_eq!(
            gate.advance(10.0, 9.5, Some(&s), ScheduleFallback::Inactive),
            GateChange::Closed
        );
    }

    #[test]
    fn test_gate_retunes_between_windows() {
        let s = Schedule::new()
            .with_entry(8.0, 9.0, 3.0)
            .with_entry(9.0, 10.0, 6.0);
        let mut gate = ScheduleGate::new(0.0);
        gate.advance(0.0, 8.5, Some(&s), ScheduleFallback::Inactive);
        assert_eq!(
            gate.advance(1.0, 9.5, Some(&s), ScheduleFallback::Inactive),
            GateChange::Retuned(6.0)
        );
    }

    #[test]
    fn test_clock_wraps_days() {
        let mut c = SimClock::at_hour(23.0);
        c.advance(7200.0);
        assert!((c.hour_of_day() - 1.0).abs() < 1e-4);
        assert_eq!(c.day(), 1);
        c.set_hour(12.0);
        assert_eq!(c.day(), 1);
        assert!((c.hour_of_day() - 12.0).abs() < 1e-4);
    }
}
