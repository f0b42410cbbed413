//! Test and helper bus doubles for bpc_core.

use bpc_traits::BusTransport;
use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Conventional factory addresses of the three sensor families.
pub const PH_ADDRESS: u8 = 99;
pub const RTD_ADDRESS: u8 = 102;
pub const DO_ADDRESS: u8 = 97;

struct ScriptedDevice {
    module: &'static str,
    values: Vec<f64>,
    idx: usize,
    pending: Option<String>,
}

impl ScriptedDevice {
    fn next_value(&mut self) -> f64 {
        let v = self
            .values
            .get(self.idx)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.0);
        if self.idx < self.values.len() {
            self.idx += 1;
        }
        v
    }
}

/// A bus with scripted devices: each answers identification, reads from
/// a canned value sequence (repeating the last value), and acknowledges
/// calibration and slope queries.
pub struct ScriptedBus {
    devices: HashMap<u8, ScriptedDevice>,
    /// When raised, every read answers status 255 (no data), the shape
    /// of a wedged device rather than a bus fault. Shared so a test can
    /// keep flipping it after the polling loop takes the bus.
    starve_reads: Arc<AtomicBool>,
    calibrations: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            starve_reads: Arc::new(AtomicBool::new(false)),
            calibrations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared starvation toggle; stays valid after the bus is moved.
    pub fn starve_handle(&self) -> Arc<AtomicBool> {
        self.starve_reads.clone()
    }

    /// Calibration commands seen so far, oldest first.
    pub fn calibration_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calibrations.clone()
    }

    pub fn with_device(
        mut self,
        address: u8,
        module: &'static str,
        values: impl Into<Vec<f64>>,
    ) -> Self {
        self.devices.insert(
            address,
            ScriptedDevice {
                module,
                values: values.into(),
                idx: 0,
                pending: None,
            },
        );
        self
    }

    /// The reference rig: pH, RTD, and DO sensors at their conventional
    /// addresses.
    pub fn standard_rig(
        ph: impl Into<Vec<f64>>,
        rtd: impl Into<Vec<f64>>,
        oxygen: impl Into<Vec<f64>>,
    ) -> Self {
        Self::new()
            .with_device(PH_ADDRESS, "pH", ph)
            .with_device(RTD_ADDRESS, "RTD", rtd)
            .with_device(DO_ADDRESS, "DO", oxygen)
    }
}

impl Default for ScriptedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusTransport for ScriptedBus {
    fn write(&mut self, address: u8, command: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let dev = self
            .devices
            .get_mut(&address)
            .ok_or_else(|| format!("no ACK from address {address}"))?;
        if command.starts_with("Cal,")
            && let Ok(mut log) = self.calibrations.lock()
        {
            log.push(command.to_string());
        }
        dev.pending = Some(command.to_string());
        Ok(())
    }

    fn read(&mut self, address: u8) -> Result<String, Box<dyn Error + Send + Sync>> {
        if self.starve_reads.load(Ordering::Relaxed) {
            return Ok("255: ".to_string());
        }
        let dev = self
            .devices
            .get_mut(&address)
            .ok_or_else(|| format!("no ACK from address {address}"))?;
        let Some(cmd) = dev.pending.take() else {
            return Ok("255: ".to_string());
        };
        let resp = if cmd == "I" {
            format!("1: ?I,{},1.98\0", dev.module)
        } else if cmd == "R" || cmd.starts_with("RT,") {
            format!("1: {:.3}\0\0", dev.next_value())
        } else if cmd.starts_with("Cal,") {
            "1: \0".to_string()
        } else if cmd == "Slope,?" {
            "1: ?Slope,99.7,100.3,-0.89\0".to_string()
        } else {
            "2: \0".to_string()
        };
        Ok(resp)
    }
}

/// A bus whose writes vanish into the void; every read reports a bus
/// fault. Useful for exercising transport-error paths.
pub struct DeadBus;

impl BusTransport for DeadBus {
    fn write(&mut self, _address: u8, _command: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    fn read(&mut self, _address: u8) -> Result<String, Box<dyn Error + Send + Sync>> {
        Err("bus fault".into())
    }
}
