#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the monitoring system.
//!
//! `Config` and sub-structs are deserialized from TOML and validated.
//! Every section and field has a default, so an empty file is a valid
//! config.

use serde::Deserialize;
use std::path::PathBuf;

/// Bus scan range for device discovery.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Bus {
    pub scan_start: u8,
    pub scan_end: u8,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            scan_start: 1,
            scan_end: 127,
        }
    }
}

/// Polling loop knobs.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Poll {
    /// Ring store capacity in samples.
    pub capacity: usize,
    /// Minimum pause between ticks (ms) on top of the settle delays.
    pub tick_interval_ms: u64,
    /// Consecutive failed ticks before a fatal disconnect.
    pub failure_budget: u8,
    /// Override every device's settle delay (ms); for simulated rigs.
    pub settle_ms: Option<u64>,
}

impl Default for Poll {
    fn default() -> Self {
        Self {
            capacity: 1000,
            tick_interval_ms: 0,
            failure_budget: 3,
            settle_ms: None,
        }
    }
}

/// Recording defaults; both must be present before recording can start.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Record {
    pub directory: Option<PathBuf>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub level: Option<String>, // "info", "debug"
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub bus: Bus,
    pub poll: Poll,
    pub record: Record,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.bus.scan_start == 0 {
            eyre::bail!("bus.scan_start must be >= 1");
        }
        if self.bus.scan_start > self.bus.scan_end {
            eyre::bail!("bus.scan_start must be <= bus.scan_end");
        }
        if self.bus.scan_end > 127 {
            eyre::bail!("bus.scan_end must be <= 127");
        }

        if self.poll.capacity == 0 {
            eyre::bail!("poll.capacity must be >= 1");
        }
        if self.poll.failure_budget == 0 {
            eyre::bail!("poll.failure_budget must be >= 1");
        }
        if self.poll.tick_interval_ms > 60 * 60 * 1000 {
            eyre::bail!("poll.tick_interval_ms is unreasonably large (>1h)");
        }

        if let Some(label) = &self.record.label
            && label.trim().is_empty()
        {
            eyre::bail!("record.label must not be blank when set");
        }
        Ok(())
    }
}
