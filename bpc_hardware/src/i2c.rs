use tracing::trace;

use crate::error::{HwError, Result};
use bpc_traits::BusTransport;
use std::error::Error;

/// Raw reply buffer size: one status byte plus up to 30 payload bytes.
const REPLY_LEN: usize = 31;

/// I2C sensor bus on the Pi. One shared `I2c` handle; the slave address
/// is switched per operation, so the bus must stay exclusive-access.
pub struct I2cBus {
    i2c: rppal::i2c::I2c,
}

impl I2cBus {
    pub fn new() -> Result<Self> {
        let i2c = rppal::i2c::I2c::new().map_err(|e| HwError::Bus(e.to_string()))?;
        Ok(Self { i2c })
    }

    fn select(&mut self, address: u8) -> Result<()> {
        self.i2c
            .set_slave_address(u16::from(address))
            .map_err(|e| HwError::Bus(e.to_string()))
    }
}

impl BusTransport for I2cBus {
    fn write(&mut self, address: u8, command: &str) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        self.select(address)?;
        self.i2c
            .write(command.as_bytes())
            .map_err(|e| HwError::Bus(e.to_string()))?;
        trace!(address, command, "i2c command sent");
        Ok(())
    }

    fn read(&mut self, address: u8) -> std::result::Result<String, Box<dyn Error + Send + Sync>> {
        self.select(address)?;
        let mut buf = [0u8; REPLY_LEN];
        self.i2c
            .read(&mut buf)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        let status = buf[0];
        // Payload bytes arrive with the high bit set on some firmware
        // revisions; mask it off and stop at the NUL terminator.
        let payload: String = buf[1..]
            .iter()
            .map(|b| (b & 0x7F) as char)
            .take_while(|c| *c != '\0')
            .collect();
        trace!(address, status, "i2c reply");
        Ok(format!("{status}: {payload}"))
    }
}
