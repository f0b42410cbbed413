//! CLI argument definitions.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bpc", version, about = "Bioprocess sensor monitor")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/bpc.toml")]
    pub config: PathBuf,

    /// Directory for data log files (overrides config)
    #[arg(long, value_name = "DIR")]
    pub record_dir: Option<PathBuf>,

    /// Label for the data log file name (overrides config)
    #[arg(long, value_name = "LABEL")]
    pub label: Option<String>,

    /// Ring store capacity in samples (overrides config)
    #[arg(long, value_name = "N")]
    pub capacity: Option<usize>,

    /// Minimum pause between polling ticks in ms (overrides config)
    #[arg(long, value_name = "MS")]
    pub tick_interval_ms: Option<u64>,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Print each sample as a JSON line instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Print the pH calibration slope after connecting, then continue
    #[arg(long, action = ArgAction::SetTrue)]
    pub slope: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}
