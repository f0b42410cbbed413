#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core acquisition and control logic (hardware-agnostic).
//!
//! This crate provides the bus-independent monitoring engine. All bus
//! interactions go through the `bpc_traits::BusTransport` trait.
//!
//! ## Architecture
//!
//! - **Registry**: address-range scan and device identification
//!   (`registry` module)
//! - **Device protocol**: command/settle/read exchanges and reply
//!   parsing (`device` module)
//! - **Store**: fixed-capacity sample history (`store` module)
//! - **Polling loop**: background acquisition thread (`poller` module)
//! - **Calibration**: pH reference-point state machine (`calibration`
//!   module)
//! - **Control surface**: the operator-facing `Controller` (`control`
//!   module)
//! - **Data log**: tab-separated recording files (`datalog` module)

pub mod calibration;
pub mod control;
pub mod datalog;
pub mod device;
pub mod error;
pub mod events;
pub mod mocks;
pub mod poller;
pub mod registry;
pub mod session;
pub mod store;
pub mod util;

pub use calibration::{CalPoint, CalibrationMode, CalibrationSession, PointState};
pub use control::Controller;
pub use datalog::DataLog;
pub use device::{DeviceHandle, DeviceKind, SlopeReading};
pub use error::{MonitorError, Report, Result};
pub use events::{MonitorEvent, WarningKind};
pub use poller::{PollCfg, PollStatus};
pub use registry::SCAN_RANGE;
pub use session::{INITIAL_COMPENSATION_C, RunState, Shared};
pub use store::{DEFAULT_CAPACITY, RingStore, Sample};
