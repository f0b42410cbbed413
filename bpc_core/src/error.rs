use crate::calibration::CalPoint;
use thiserror::Error;

/// Typed error taxonomy for the acquisition core.
///
/// Device-level errors (`DeviceTimeout`, `MalformedResponse`) abort the
/// current tick only; `Transport` is fatal to the tick as well. Operator
/// precondition violations never reach the polling loop.
#[derive(Debug, Error, Clone)]
pub enum MonitorError {
    #[error("bus transport error: {0}")]
    Transport(String),
    #[error("device '{0}' timed out")]
    DeviceTimeout(String),
    #[error("malformed response from '{device}': {payload:?}")]
    MalformedResponse { device: String, payload: String },
    #[error("no devices found on the bus")]
    NoDevicesFound,
    #[error("not connected")]
    NotConnected,
    #[error("no target directory selected")]
    NoTargetDirectory,
    #[error("no user label provided")]
    NoUserLabel,
    #[error("calibration point {0} is not enabled in the current mode")]
    PointNotEnabled(CalPoint),
    #[error("calibration is not active")]
    CalibrationInactive,
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Map a boxed transport error to a typed `MonitorError`, with special
/// handling for hardware errors when the `hardware-errors` feature is on.
pub(crate) fn map_transport_err(e: &(dyn std::error::Error + 'static)) -> MonitorError {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<bpc_hardware::error::HwError>() {
        return match hw {
            bpc_hardware::error::HwError::Timeout => MonitorError::Transport("bus timeout".into()),
            other => MonitorError::Transport(other.to_string()),
        };
    }
    MonitorError::Transport(e.to_string())
}
