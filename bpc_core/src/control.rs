//! Control surface: the command/state contract the presentation layer
//! drives.
//!
//! A `Controller` owns the session state, the cancellation flag, and the
//! polling thread handle. There is at most one active loop per connected
//! session. Every operation is idempotent against redundant calls:
//! stopping something already stopped is a no-op, not an error.

use crate::calibration::{CalPoint, CalibrationMode, PointState};
use crate::datalog::DataLog;
use crate::device::{DeviceHandle, SlopeReading};
use crate::error::{MonitorError, Report, Result};
use crate::events::MonitorEvent;
use crate::poller::{BusRequest, PollCfg, PollHandle, PollLoop};
use crate::registry;
use crate::session::{Shared, lock};
use crate::store::{DEFAULT_CAPACITY, Sample};
use crate::util::CancellableClock;
use bpc_traits::clock::MonotonicClock;
use bpc_traits::{BusTransport, Clock};
use chrono::{DateTime, Local};
use crossbeam_channel as xch;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct Controller {
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: PollCfg,
    scan_range: RangeInclusive<u8>,
    poller: Option<PollHandle>,
    requests: Option<xch::Sender<BusRequest>>,
    events_tx: xch::Sender<MonitorEvent>,
    events_rx: xch::Receiver<MonitorEvent>,
    devices: Vec<DeviceHandle>,
}

impl Controller {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_CAPACITY, PollCfg::default())
    }

    pub fn with_settings(capacity: usize, cfg: PollCfg) -> Self {
        let (events_tx, events_rx) = xch::unbounded();
        Self {
            shared: Arc::new(Shared::new(capacity)),
            shutdown: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(MonotonicClock::new()),
            cfg,
            scan_range: registry::SCAN_RANGE,
            poller: None,
            requests: None,
            events_tx,
            events_rx,
            devices: Vec::new(),
        }
    }

    pub fn from_config(config: &bpc_config::Config) -> Self {
        let mut controller =
            Self::with_settings(config.poll.capacity, PollCfg::from(&config.poll));
        controller.scan_range = config.bus.scan_start..=config.bus.scan_end;
        controller
    }

    /// Substitute the clock; mainly for deterministic tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Receiver half of the core-to-presentation event stream. Clones
    /// share one stream; each event is seen by exactly one receiver.
    pub fn events(&self) -> xch::Receiver<MonitorEvent> {
        self.events_rx.clone()
    }

    /// Handles from the most recent discovery.
    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn is_connected(&self) -> bool {
        self.shared.run.lock().map(|r| r.connected).unwrap_or(false)
    }

    pub fn is_charting(&self) -> bool {
        self.shared.run.lock().map(|r| r.charting).unwrap_or(false)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.run.lock().map(|r| r.recording).unwrap_or(false)
    }

    pub fn is_calibrating(&self) -> bool {
        self.shared
            .calibration
            .lock()
            .map(|c| c.is_active())
            .unwrap_or(false)
    }

    /// Flag state of one calibration reference point.
    pub fn calibration_state(&self, point: CalPoint) -> PointState {
        self.shared
            .calibration
            .lock()
            .map(|c| c.state(point))
            .unwrap_or_default()
    }

    /// Discover devices and start the polling loop. Fails with
    /// `NoDevicesFound` when the scan yields nothing; already connected
    /// is a no-op.
    pub fn connect<T: BusTransport + Send + 'static>(&mut self, mut bus: T) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        // Reap a loop that died on its own (fatal disconnect).
        self.poller = None;
        self.requests = None;
        self.shutdown.store(false, Ordering::Relaxed);

        let mut devices = registry::discover(&mut bus, &*self.clock, self.scan_range.clone())?;
        if let Some(ms) = self.cfg.settle_override_ms {
            for handle in &mut devices {
                handle.settle = Duration::from_millis(ms);
            }
        }

        {
            let mut run = lock(&self.shared.run, "run state")?;
            run.reset();
            run.connected = true;
        }
        lock(&self.shared.store, "ring store")?.clear();
        lock(&self.shared.calibration, "calibration")?.end();

        let (req_tx, req_rx) = xch::bounded(4);
        let clock = CancellableClock::new(self.clock.clone(), self.shutdown.clone());
        let poll_loop = PollLoop::new(
            bus,
            devices.clone(),
            self.shared.clone(),
            self.shutdown.clone(),
            self.events_tx.clone(),
            req_rx,
            clock,
            self.cfg.clone(),
        );
        self.devices = devices;
        self.poller = Some(PollHandle::spawn(poll_loop));
        self.requests = Some(req_tx);
        tracing::info!(devices = self.devices.len(), "connected");
        Ok(())
    }

    /// Raise the cancellation signal, join the loop, reset the session.
    pub fn disconnect(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.poller = None; // joins the thread
        self.requests = None;
        self.devices.clear();
        if let Some(mut log) = lock(&self.shared.log, "data log")?.take() {
            if let Err(e) = log.close() {
                tracing::warn!(error = %e, "data log close failed on disconnect");
            }
        }
        lock(&self.shared.run, "run state")?.reset();
        lock(&self.shared.calibration, "calibration")?.end();
        Ok(())
    }

    /// Start live charting, anchoring the chart window at now.
    pub fn start_charting(&mut self) -> Result<()> {
        let mut run = lock(&self.shared.run, "run state")?;
        if !run.connected {
            return Err(Report::new(MonitorError::NotConnected));
        }
        if !run.charting {
            run.charting = true;
            run.chart_start = Local::now();
        }
        Ok(())
    }

    pub fn stop_charting(&mut self) -> Result<()> {
        lock(&self.shared.run, "run state")?.charting = false;
        Ok(())
    }

    /// Reset the chart window anchor and stop charting, matching the
    /// operator's "clear chart" action.
    pub fn clear_chart(&mut self) -> Result<()> {
        let mut run = lock(&self.shared.run, "run state")?;
        run.chart_start = Local::now();
        run.charting = false;
        Ok(())
    }

    /// Open a fresh data log and start appending one line per sample.
    /// Returns the created file's path.
    pub fn start_recording(&mut self, dir: Option<&Path>, label: Option<&str>) -> Result<PathBuf> {
        let dir = dir.ok_or_else(|| Report::new(MonitorError::NoTargetDirectory))?;
        let label = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Report::new(MonitorError::NoUserLabel))?;

        let mut run = lock(&self.shared.run, "run state")?;
        if !run.connected {
            return Err(Report::new(MonitorError::NotConnected));
        }
        if lock(&self.shared.calibration, "calibration")?.is_active() {
            return Err(Report::new(MonitorError::State(
                "calibration in progress; recording is disabled".into(),
            )));
        }
        let mut log = lock(&self.shared.log, "data log")?;
        if run.recording {
            // Already recording: keep the current file.
            if let Some(log) = log.as_ref() {
                return Ok(log.path().to_path_buf());
            }
        }
        let new_log = DataLog::create(dir, label, Local::now())
            .map_err(|e| Report::new(MonitorError::Io(e.to_string())))?;
        let path = new_log.path().to_path_buf();
        *log = Some(new_log);
        run.recording = true;
        Ok(path)
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        lock(&self.shared.run, "run state")?.recording = false;
        if let Some(mut log) = lock(&self.shared.log, "data log")?.take() {
            log.close()
                .map_err(|e| Report::new(MonitorError::Io(e.to_string())))?;
        }
        Ok(())
    }

    /// Enter calibration. Forces recording off first: calibration
    /// transients must not end up in the data log.
    pub fn start_calibration(&mut self) -> Result<()> {
        {
            let run = lock(&self.shared.run, "run state")?;
            if !run.connected {
                return Err(Report::new(MonitorError::NotConnected));
            }
        }
        self.stop_recording()?;
        let mut calibration = lock(&self.shared.calibration, "calibration")?;
        if !calibration.is_active() {
            calibration.begin();
        }
        Ok(())
    }

    /// Select 1-, 2- or 3-point calibration.
    pub fn set_calibration_mode(&mut self, points: u8) -> Result<()> {
        let mode = CalibrationMode::from_points(points).ok_or_else(|| {
            Report::new(MonitorError::State(format!(
                "unsupported calibration point count: {points}"
            )))
        })?;
        lock(&self.shared.calibration, "calibration")?.set_mode(mode);
        Ok(())
    }

    /// Flag a reference point; the polling loop sends the calibration
    /// command before its next tick.
    pub fn request_calibration_point(&mut self, point: CalPoint) -> Result<()> {
        lock(&self.shared.calibration, "calibration")?
            .request(point)
            .map_err(Report::new)
    }

    pub fn end_calibration(&mut self) -> Result<()> {
        lock(&self.shared.calibration, "calibration")?.end();
        Ok(())
    }

    /// Slope/offset readback from the pH device, serviced by the polling
    /// loop between ticks.
    pub fn read_slope(&self, timeout: Duration) -> Result<SlopeReading> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| Report::new(MonitorError::NotConnected))?;
        let (tx, rx) = xch::bounded(1);
        requests
            .send(BusRequest::Slope { reply: tx })
            .map_err(|_| Report::new(MonitorError::NotConnected))?;
        match rx.recv_timeout(timeout) {
            Ok(Ok(slope)) => Ok(slope),
            Ok(Err(e)) => Err(Report::new(e)),
            Err(_) => Err(Report::new(MonitorError::DeviceTimeout("pH".into()))),
        }
    }

    /// Most recent sample, if any was acquired this session.
    pub fn latest(&self) -> Option<Sample> {
        self.shared
            .store
            .lock()
            .ok()
            .and_then(|s| s.latest().cloned())
    }

    /// Chronological snapshot of samples since `t0`.
    pub fn window_since(&self, t0: DateTime<Local>) -> Vec<Sample> {
        self.shared
            .store
            .lock()
            .map(|s| s.window_since(t0))
            .unwrap_or_default()
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "disconnect on drop failed");
        }
    }
}
