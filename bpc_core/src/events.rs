//! Events published by the polling loop to the presentation layer.

use crate::store::Sample;

/// Category of a recoverable warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    DeviceTimeout,
    MalformedResponse,
    Transport,
    LogWrite,
    Calibration,
}

/// Core-to-presentation contract, delivered over a channel so the UI
/// thread never touches the loop's mutable state directly.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A sample was acquired this tick.
    Sample(Sample),
    /// Charting is on; redraw from this window snapshot.
    ChartWindow(Vec<Sample>),
    /// A recoverable, non-blocking warning.
    Warning { kind: WarningKind, message: String },
    /// The failure budget was exhausted; the session is torn down and
    /// the operator must reconnect.
    FatalDisconnect { reason: String },
}
