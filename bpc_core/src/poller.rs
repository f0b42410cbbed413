//! Background acquisition loop.
//!
//! One loop per connected session. Each tick queries every discovered
//! device serially (settle delays are additive: the bus is
//! exclusive-access), assembles a `Sample`, pushes it into the ring
//! store, and dispatches side effects — log append, chart window event,
//! pending calibration commands. Cancellation is cooperative at the tick
//! boundary; settle waits themselves are interruptible so a disconnect
//! is not pinned behind a full tick of sleeps.
//!
//! A failed tick stores no partial sample and surfaces as a recoverable
//! warning; after `failure_budget` consecutive failures the loop tears
//! the session down and reports a fatal disconnect.

use crate::device::{DeviceHandle, DeviceKind, SlopeReading};
use crate::error::{MonitorError, Result};
use crate::events::{MonitorEvent, WarningKind};
use crate::session::{Shared, lock};
use crate::store::Sample;
use crate::util::{CancellableClock, wait_cancellable};
use bpc_traits::BusTransport;
use chrono::Local;
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Runtime knobs of the polling loop, separate from the TOML schema in
/// `bpc_config`.
#[derive(Debug, Clone)]
pub struct PollCfg {
    /// Consecutive failed ticks before a fatal disconnect.
    pub failure_budget: u8,
    /// Minimum pause between ticks on top of the settle delays.
    pub tick_interval_ms: u64,
    /// Override every device's settle delay (ms); mainly for simulated
    /// rigs and tests.
    pub settle_override_ms: Option<u64>,
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            failure_budget: 3,
            tick_interval_ms: 0,
            settle_override_ms: None,
        }
    }
}

impl From<&bpc_config::Poll> for PollCfg {
    fn from(p: &bpc_config::Poll) -> Self {
        Self {
            failure_budget: p.failure_budget,
            tick_interval_ms: p.tick_interval_ms,
            settle_override_ms: p.settle_ms,
        }
    }
}

/// On-demand bus work serviced between ticks.
pub enum BusRequest {
    /// Read back the pH device's calibration slope.
    Slope {
        reply: xch::Sender<std::result::Result<SlopeReading, MonitorError>>,
    },
}

/// Outcome of one `step()` of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    /// Cancellation observed at the tick boundary.
    Stopped,
    /// Failure budget exhausted; session torn down.
    Disconnected,
}

/// The acquisition loop state: owns the bus transport and the device
/// handles for the lifetime of one connected session.
pub struct PollLoop<T: BusTransport> {
    bus: T,
    devices: Vec<DeviceHandle>,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    events: xch::Sender<MonitorEvent>,
    requests: xch::Receiver<BusRequest>,
    clock: CancellableClock,
    cfg: PollCfg,
    consecutive_failures: u8,
}

impl<T: BusTransport> PollLoop<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: T,
        devices: Vec<DeviceHandle>,
        shared: Arc<Shared>,
        shutdown: Arc<AtomicBool>,
        events: xch::Sender<MonitorEvent>,
        requests: xch::Receiver<BusRequest>,
        clock: CancellableClock,
        cfg: PollCfg,
    ) -> Self {
        Self {
            bus,
            devices,
            shared,
            shutdown,
            events,
            requests,
            clock,
            cfg,
            consecutive_failures: 0,
        }
    }

    /// Run until cancelled or disconnected. Consumes the loop; the bus
    /// transport dies with the session.
    pub fn run(mut self) {
        tracing::info!(devices = self.devices.len(), "polling loop started");
        while self.step() == PollStatus::Running {}
        tracing::trace!("polling loop exiting cleanly");
    }

    /// One full cycle: tick, failure accounting, queued bus requests,
    /// pending calibration points, inter-tick pause.
    pub fn step(&mut self) -> PollStatus {
        if self.shutdown.load(Ordering::Relaxed) {
            tracing::debug!("polling loop received shutdown signal");
            return PollStatus::Stopped;
        }
        match self.tick() {
            Ok(()) => self.consecutive_failures = 0,
            Err(e) => {
                // A cancelled settle wait makes the in-flight read look
                // like a device timeout; don't count that as a failure.
                if self.shutdown.load(Ordering::Relaxed) {
                    return PollStatus::Stopped;
                }
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let kind = classify(&e);
                tracing::warn!(
                    error = %e,
                    consecutive = self.consecutive_failures,
                    "tick failed, no sample stored"
                );
                let _ = self.events.send(MonitorEvent::Warning {
                    kind,
                    message: e.to_string(),
                });
                if self.consecutive_failures >= self.cfg.failure_budget.max(1) {
                    self.fatal_disconnect(format!(
                        "{} consecutive failed ticks, last error: {e}",
                        self.consecutive_failures
                    ));
                    return PollStatus::Disconnected;
                }
            }
        }
        self.service_requests();
        self.service_calibration();
        if self.cfg.tick_interval_ms > 0 {
            wait_cancellable(
                &self.clock,
                Duration::from_millis(self.cfg.tick_interval_ms),
                &self.shutdown,
            );
        }
        PollStatus::Running
    }

    /// Query all devices, store the sample, dispatch log/chart effects.
    /// Any device error aborts the whole tick; no partial sample.
    fn tick(&mut self) -> Result<()> {
        let compensation_c = lock(&self.shared.run, "run state")?.ph_compensation_c;

        let mut ph = None;
        let mut temperature = None;
        let mut oxygen = None;
        for handle in &self.devices {
            let value = match handle.kind {
                DeviceKind::Ph => {
                    handle.read_compensated(&mut self.bus, &self.clock, compensation_c)?
                }
                _ => handle.read_value(&mut self.bus, &self.clock)?,
            };
            match handle.kind {
                DeviceKind::Ph => ph = Some(value),
                DeviceKind::Temperature => temperature = Some(value),
                DeviceKind::DissolvedOxygen => oxygen = Some(value),
            }
        }

        let sample = Sample {
            at: Local::now(),
            ph,
            temperature,
            dissolved_oxygen: oxygen,
        };
        lock(&self.shared.store, "ring store")?.push(sample.clone());

        let (recording, charting, chart_start) = {
            let mut run = lock(&self.shared.run, "run state")?;
            if let Some(t) = temperature {
                run.ph_compensation_c = t;
            }
            (run.recording, run.charting, run.chart_start)
        };

        if recording {
            let mut log = lock(&self.shared.log, "data log")?;
            if let Some(log) = log.as_mut() {
                if let Err(e) = log.append(&sample) {
                    tracing::warn!(error = %e, "data log append failed");
                    let _ = self.events.send(MonitorEvent::Warning {
                        kind: WarningKind::LogWrite,
                        message: e.to_string(),
                    });
                }
            }
        }

        let _ = self.events.send(MonitorEvent::Sample(sample));

        if charting {
            let window = lock(&self.shared.store, "ring store")?.window_since(chart_start);
            let _ = self.events.send(MonitorEvent::ChartWindow(window));
        }
        Ok(())
    }

    /// Service at most one queued on-demand bus request.
    fn service_requests(&mut self) {
        let Ok(request) = self.requests.try_recv() else {
            return;
        };
        match request {
            BusRequest::Slope { reply } => {
                let result = match self.ph_handle().cloned() {
                    Some(handle) => handle
                        .read_slope(&mut self.bus, &self.clock)
                        .map_err(into_monitor_error),
                    None => Err(MonitorError::State("no pH device on the bus".into())),
                };
                let _ = reply.send(result);
            }
        }
    }

    /// Perform any requested calibration point before the next tick.
    fn service_calibration(&mut self) {
        let point = match lock(&self.shared.calibration, "calibration") {
            Ok(session) => session.next_requested(),
            Err(_) => None,
        };
        let Some(point) = point else {
            return;
        };
        let Some(handle) = self.ph_handle().cloned() else {
            return;
        };
        // Bus command outside the lock; the settle delay is long.
        let outcome = handle.calibrate(&mut self.bus, &self.clock, point);
        if let Ok(mut session) = self.shared.calibration.lock() {
            match outcome {
                Ok(()) => session.confirm(point),
                Err(ref e) => {
                    tracing::warn!(point = %point, error = %e, "calibration command failed");
                    session.reset(point);
                    let _ = self.events.send(MonitorEvent::Warning {
                        kind: WarningKind::Calibration,
                        message: format!("calibration point {point} failed: {e}"),
                    });
                }
            }
        }
    }

    /// Tear the session down after an exhausted failure budget: reset
    /// all toggles, close the log, discard calibration, notify the UI.
    fn fatal_disconnect(&mut self, reason: String) {
        tracing::error!(%reason, "fatal disconnect, operator must reconnect");
        if let Ok(mut run) = self.shared.run.lock() {
            run.reset();
        }
        if let Ok(mut calibration) = self.shared.calibration.lock() {
            calibration.end();
        }
        if let Ok(mut log) = self.shared.log.lock() {
            if let Some(mut log) = log.take() {
                if let Err(e) = log.close() {
                    tracing::warn!(error = %e, "data log close failed during teardown");
                }
            }
        }
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.events.send(MonitorEvent::FatalDisconnect { reason });
    }

    fn ph_handle(&self) -> Option<&DeviceHandle> {
        self.devices.iter().find(|h| h.kind == DeviceKind::Ph)
    }
}

/// Background thread wrapper around a `PollLoop`.
///
/// Safety: each handle owns exactly one thread that is shut down and
/// joined when the handle is dropped, preventing thread leaks.
pub struct PollHandle {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl PollHandle {
    pub fn spawn<T: BusTransport + Send + 'static>(poll_loop: PollLoop<T>) -> Self {
        let shutdown = poll_loop.shutdown.clone();
        let join_handle = std::thread::spawn(move || poll_loop.run());
        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits at the next tick boundary; interruptible
        // settle waits keep that bounded by one wait slice plus the
        // in-flight transport read.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("polling thread joined"),
                Err(e) => tracing::warn!(?e, "polling thread panicked during shutdown"),
            }
        }
    }
}

fn classify(e: &eyre::Report) -> WarningKind {
    match e.downcast_ref::<MonitorError>() {
        Some(MonitorError::DeviceTimeout(_)) => WarningKind::DeviceTimeout,
        Some(MonitorError::MalformedResponse { .. }) => WarningKind::MalformedResponse,
        _ => WarningKind::Transport,
    }
}

fn into_monitor_error(e: eyre::Report) -> MonitorError {
    match e.downcast::<MonitorError>() {
        Ok(err) => err,
        Err(e) => MonitorError::State(e.to_string()),
    }
}
