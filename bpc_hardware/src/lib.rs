pub mod error;
#[cfg(feature = "hardware")]
pub mod i2c;

#[cfg(feature = "hardware")]
pub use i2c::I2cBus;

use bpc_traits::BusTransport;
use std::collections::HashMap;
use std::error::Error;

/// One simulated sensor on the bus.
struct SimDevice {
    module: &'static str,
    base: f64,
    wobble: f64,
    tick: u32,
    pending: Option<String>,
}

impl SimDevice {
    fn next_value(&mut self) -> f64 {
        // Triangular wobble around the base value, period 20 ticks.
        let phase = (self.tick % 20) as f64;
        self.tick = self.tick.wrapping_add(1);
        let offset = if phase < 10.0 { phase } else { 20.0 - phase };
        self.base + self.wobble * (offset - 5.0) / 5.0
    }
}

/// Simulated sensor bus: a pH probe at 99, an RTD at 102 and a DO probe
/// at 97, each answering the wire protocol with gently wobbling values.
pub struct SimulatedBus {
    devices: HashMap<u8, SimDevice>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            99,
            SimDevice {
                module: "pH",
                base: 7.02,
                wobble: 0.05,
                tick: 0,
                pending: None,
            },
        );
        devices.insert(
            102,
            SimDevice {
                module: "RTD",
                base: 24.8,
                wobble: 0.3,
                tick: 7,
                pending: None,
            },
        );
        devices.insert(
            97,
            SimDevice {
                module: "DO",
                base: 96.5,
                wobble: 1.2,
                tick: 13,
                pending: None,
            },
        );
        Self { devices }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusTransport for SimulatedBus {
    fn write(&mut self, address: u8, command: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let Some(dev) = self.devices.get_mut(&address) else {
            return Err(Box::new(error::HwError::Bus(format!(
                "no ACK from address {address}"
            ))));
        };
        dev.pending = Some(command.to_string());
        Ok(())
    }

    fn read(&mut self, address: u8) -> Result<String, Box<dyn Error + Send + Sync>> {
        let Some(dev) = self.devices.get_mut(&address) else {
            return Err(Box::new(error::HwError::Bus(format!(
                "no ACK from address {address}"
            ))));
        };
        let Some(cmd) = dev.pending.take() else {
            return Ok("255: ".to_string());
        };
        let resp = if cmd == "I" {
            format!("1: ?I,{},2.12", dev.module)
        } else if cmd == "R" || cmd.starts_with("RT,") {
            format!("1: {:.3}", dev.next_value())
        } else if cmd.starts_with("Cal,") {
            tracing::info!(address, command = %cmd, "simulated calibration accepted");
            "1: ".to_string()
        } else if cmd == "Slope,?" {
            "1: ?Slope,99.7,100.3,-0.89".to_string()
        } else {
            "2: ".to_string()
        };
        Ok(resp)
    }
}
