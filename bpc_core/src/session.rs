//! Session-scoped shared state.
//!
//! One `Shared` per operator session, owned by the control surface and
//! handed to the polling loop by `Arc`. The loop is the only writer of
//! the store; the presentation thread reads through the mutexes or via
//! event snapshots. Everything here is reset on disconnect.

use crate::calibration::CalibrationSession;
use crate::datalog::DataLog;
use crate::error::{MonitorError, Report, Result};
use crate::store::RingStore;
use chrono::{DateTime, Local};
use std::sync::{Mutex, MutexGuard};

/// Operator-visible run toggles and loop feedback values.
#[derive(Debug)]
pub struct RunState {
    pub connected: bool,
    pub charting: bool,
    pub recording: bool,
    /// Left edge of the chart window; reset by "clear chart".
    pub chart_start: DateTime<Local>,
    /// Most recent temperature reading, fed back into pH queries.
    pub ph_compensation_c: f64,
}

/// Compensation used before the first real temperature reading.
pub const INITIAL_COMPENSATION_C: f64 = 22.0;

impl Default for RunState {
    fn default() -> Self {
        Self {
            connected: false,
            charting: false,
            recording: false,
            chart_start: Local::now(),
            ph_compensation_c: INITIAL_COMPENSATION_C,
        }
    }
}

impl RunState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The shared mutable resources of one session: ring store, run state,
/// calibration session, and the open data log (if recording).
#[derive(Debug, Default)]
pub struct Shared {
    pub store: Mutex<RingStore>,
    pub run: Mutex<RunState>,
    pub calibration: Mutex<CalibrationSession>,
    pub log: Mutex<Option<DataLog>>,
}

impl Shared {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: Mutex::new(RingStore::new(capacity)),
            ..Self::default()
        }
    }
}

/// Lock a session mutex, converting poisoning into a typed state error.
pub(crate) fn lock<'a, T>(m: &'a Mutex<T>, what: &'static str) -> Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| Report::new(MonitorError::State(format!("{what} lock poisoned"))))
}
