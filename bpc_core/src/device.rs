//! Per-device request/response protocol.
//!
//! Devices answer `"<status>: <payload>"` with trailing NUL padding.
//! Status 1 is success, 2 a syntax error, 254 still-processing and 255
//! no-data-pending; the last two read as a device timeout. Every command
//! is followed by the device's settle delay before the reply is read —
//! the bus is exclusive-access, so these delays are additive across a
//! polling tick by design.

use crate::calibration::CalPoint;
use crate::error::{MonitorError, Report, Result, map_transport_err};
use bpc_traits::{BusTransport, Clock};
use std::time::Duration;

/// Settle delay for reads and calibration commands (the device's "long"
/// command window).
pub const READ_SETTLE: Duration = Duration::from_millis(900);
/// Settle delay for identification queries (the "short" window).
pub const ID_SETTLE: Duration = Duration::from_millis(300);

/// Sensor family on the bus, declared by the identification reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Ph,
    Temperature,
    DissolvedOxygen,
}

impl DeviceKind {
    /// Parse the module field of an identification payload.
    pub fn from_module(module: &str) -> Option<Self> {
        match module {
            "pH" => Some(DeviceKind::Ph),
            "RTD" => Some(DeviceKind::Temperature),
            "DO" | "D.O." => Some(DeviceKind::DissolvedOxygen),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::Ph => "pH",
            DeviceKind::Temperature => "RTD",
            DeviceKind::DissolvedOxygen => "DO",
        }
    }
}

/// Immutable handle to a discovered device; identity is the bus address.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub address: u8,
    pub kind: DeviceKind,
    pub name: String,
    pub settle: Duration,
}

impl DeviceHandle {
    pub fn new(address: u8, kind: DeviceKind) -> Self {
        Self {
            address,
            kind,
            name: kind.label().to_string(),
            settle: READ_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Send `command`, wait out the settle delay, read and unwrap the
    /// reply payload.
    pub fn query<T: BusTransport + ?Sized>(
        &self,
        bus: &mut T,
        clock: &dyn Clock,
        command: &str,
    ) -> Result<String> {
        bus.write(self.address, command)
            .map_err(|e| Report::new(map_transport_err(&*e)))?;
        clock.sleep(self.settle);
        let resp = bus
            .read(self.address)
            .map_err(|e| Report::new(map_transport_err(&*e)))?;
        self.unwrap_payload(&resp)
    }

    /// Plain read: `R`.
    pub fn read_value<T: BusTransport + ?Sized>(
        &self,
        bus: &mut T,
        clock: &dyn Clock,
    ) -> Result<f64> {
        let payload = self.query(bus, clock, "R")?;
        self.parse_value(&payload)
    }

    /// Temperature-compensated read, pH devices only: `RT,<temp>`.
    pub fn read_compensated<T: BusTransport + ?Sized>(
        &self,
        bus: &mut T,
        clock: &dyn Clock,
        temp_c: f64,
    ) -> Result<f64> {
        let payload = self.query(bus, clock, &format!("RT,{temp_c:.2}"))?;
        self.parse_value(&payload)
    }

    /// Send the calibration command for `point` and wait out the settle
    /// delay; the reply payload carries no data.
    pub fn calibrate<T: BusTransport + ?Sized>(
        &self,
        bus: &mut T,
        clock: &dyn Clock,
        point: CalPoint,
    ) -> Result<()> {
        self.query(bus, clock, point.command())?;
        tracing::info!(device = %self.name, point = %point, "calibration point set");
        Ok(())
    }

    /// Read back the device's calibration slope: `Slope,?` answers
    /// `?Slope,<acid>,<base>,<zero>`.
    pub fn read_slope<T: BusTransport + ?Sized>(
        &self,
        bus: &mut T,
        clock: &dyn Clock,
    ) -> Result<SlopeReading> {
        let payload = self.query(bus, clock, "Slope,?")?;
        let trimmed = trim_padding(&payload);
        let mut fields = trimmed.split(',');
        let tag = fields.next().unwrap_or_default();
        if tag != "?Slope" {
            return Err(Report::new(self.malformed(&payload)));
        }
        let mut next = || -> Result<f64> {
            fields
                .next()
                .map(trim_padding)
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| Report::new(self.malformed(&payload)))
        };
        let acid = next()?;
        let base = next()?;
        let zero = next()?;
        Ok(SlopeReading { acid, base, zero })
    }

    /// Strip the status prefix, mapping device status codes to errors.
    fn unwrap_payload(&self, resp: &str) -> Result<String> {
        let Some((code, payload)) = resp.split_once(':') else {
            return Err(Report::new(self.malformed(resp)));
        };
        match code.trim() {
            "1" => Ok(payload.trim_start().to_string()),
            "254" | "255" => Err(Report::new(MonitorError::DeviceTimeout(self.name.clone()))),
            _ => Err(Report::new(self.malformed(resp))),
        }
    }

    /// Parse a numeric payload, stripping NUL padding.
    fn parse_value(&self, payload: &str) -> Result<f64> {
        trim_padding(payload)
            .parse::<f64>()
            .map_err(|_| Report::new(self.malformed(payload)))
    }

    fn malformed(&self, payload: &str) -> MonitorError {
        MonitorError::MalformedResponse {
            device: self.name.clone(),
            payload: payload.to_string(),
        }
    }
}

/// Calibration slope readback of the pH device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeReading {
    /// Acid-side slope, percent of ideal.
    pub acid: f64,
    /// Base-side slope, percent of ideal.
    pub base: f64,
    /// Zero-point offset in millivolts.
    pub zero: f64,
}

fn trim_padding(s: &str) -> &str {
    s.trim_matches(['\0', ' ', '\r', '\n', '\t'])
}
