//! pH calibration state machine.
//!
//! A session is `Inactive` until the operator starts calibration, then
//! `ActiveAwaitingPoints` until ended (or the session disconnects). While
//! active, each reference point carries its own flag: `Pending` until
//! requested, `Requested` until the polling loop has sent the command and
//! waited out the device settle delay, then `Confirmed`. Confirmed points
//! may be re-requested.
//!
//! Which points are selectable depends on the configured mode, and the
//! session rejects requests for disabled points itself even though the
//! control surface gates them too.

use crate::error::MonitorError;

/// A pH reference buffer point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalPoint {
    Mid,
    Low,
    High,
}

impl CalPoint {
    pub const ALL: [CalPoint; 3] = [CalPoint::Mid, CalPoint::Low, CalPoint::High];

    /// Reference buffer value in pH units.
    pub fn reference(self) -> f64 {
        match self {
            CalPoint::Mid => 7.0,
            CalPoint::Low => 4.0,
            CalPoint::High => 10.0,
        }
    }

    /// Wire command sent to the pH device for this point.
    pub fn command(self) -> &'static str {
        match self {
            CalPoint::Mid => "Cal,mid,7.00",
            CalPoint::Low => "Cal,low,4.00",
            CalPoint::High => "Cal,high,10.00",
        }
    }

    fn index(self) -> usize {
        match self {
            CalPoint::Mid => 0,
            CalPoint::Low => 1,
            CalPoint::High => 2,
        }
    }
}

impl std::fmt::Display for CalPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CalPoint::Mid => "mid",
            CalPoint::Low => "low",
            CalPoint::High => "high",
        };
        f.write_str(s)
    }
}

/// How many reference points the operator intends to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMode {
    OnePoint,
    TwoPoint,
    ThreePoint,
}

impl CalibrationMode {
    pub fn from_points(points: u8) -> Option<Self> {
        match points {
            1 => Some(CalibrationMode::OnePoint),
            2 => Some(CalibrationMode::TwoPoint),
            3 => Some(CalibrationMode::ThreePoint),
            _ => None,
        }
    }

    /// 1-point enables only mid; 2-point adds low; 3-point all three.
    pub fn enables(self, point: CalPoint) -> bool {
        match self {
            CalibrationMode::OnePoint => matches!(point, CalPoint::Mid),
            CalibrationMode::TwoPoint => matches!(point, CalPoint::Mid | CalPoint::Low),
            CalibrationMode::ThreePoint => true,
        }
    }
}

/// Per-point flag state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    #[default]
    Pending,
    Requested,
    Confirmed,
}

/// Calibration session owned by the shared state; mutated by the control
/// surface (requests) and the polling loop (confirmations).
#[derive(Debug, Default)]
pub struct CalibrationSession {
    active: bool,
    mode: Option<CalibrationMode>,
    points: [PointState; 3],
}

impl CalibrationSession {
    /// Enter `ActiveAwaitingPoints` with fresh point flags. The default
    /// mode is two-point (mid + low) until the operator picks another.
    pub fn begin(&mut self) {
        self.active = true;
        self.mode.get_or_insert(CalibrationMode::TwoPoint);
        self.points = [PointState::Pending; 3];
    }

    /// Terminal transition back to `Inactive`; discards point flags.
    pub fn end(&mut self) {
        self.active = false;
        self.mode = None;
        self.points = [PointState::Pending; 3];
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> Option<CalibrationMode> {
        self.mode
    }

    /// Change the point-count mode. Requested flags for points the new
    /// mode disables are dropped back to `Pending`.
    pub fn set_mode(&mut self, mode: CalibrationMode) {
        self.mode = Some(mode);
        for point in CalPoint::ALL {
            if !mode.enables(point) && self.points[point.index()] == PointState::Requested {
                self.points[point.index()] = PointState::Pending;
            }
        }
    }

    pub fn state(&self, point: CalPoint) -> PointState {
        self.points[point.index()]
    }

    /// Flag a point for the polling loop to calibrate before its next
    /// tick. Confirmed points may be requested again.
    pub fn request(&mut self, point: CalPoint) -> Result<(), MonitorError> {
        if !self.active {
            return Err(MonitorError::CalibrationInactive);
        }
        let mode = self.mode.unwrap_or(CalibrationMode::TwoPoint);
        if !mode.enables(point) {
            return Err(MonitorError::PointNotEnabled(point));
        }
        self.points[point.index()] = PointState::Requested;
        Ok(())
    }

    /// The next requested point, if any (mid, then low, then high).
    pub fn next_requested(&self) -> Option<CalPoint> {
        CalPoint::ALL
            .into_iter()
            .find(|p| self.points[p.index()] == PointState::Requested)
    }

    /// Record a completed calibration command; the flag leaves `Requested`
    /// so the operator may re-trigger the point. Ignored once the session
    /// has ended: a command completing after `end()` must not leave a
    /// stale flag on an inactive session.
    pub fn confirm(&mut self, point: CalPoint) {
        if self.active {
            self.points[point.index()] = PointState::Confirmed;
        }
    }

    /// Drop a requested point back to `Pending` after a failed command.
    /// Ignored once the session has ended.
    pub fn reset(&mut self, point: CalPoint) {
        if self.active {
            self.points[point.index()] = PointState::Pending;
        }
    }

    /// Reference points completed so far in this session.
    pub fn completed(&self) -> Vec<CalPoint> {
        CalPoint::ALL
            .into_iter()
            .filter(|p| self.points[p.index()] == PointState::Confirmed)
            .collect()
    }
}
