mod cli;

use clap::Parser;
use cli::Cli;
use eyre::{Result, WrapErr};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bpc_core::{Controller, MonitorEvent, Sample};

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let mut config = if args.config.exists() {
        let text = fs::read_to_string(&args.config)
            .wrap_err_with(|| format!("failed to read {}", args.config.display()))?;
        bpc_config::load_toml(&text)
            .wrap_err_with(|| format!("invalid config {}", args.config.display()))?
    } else {
        bpc_config::Config::default()
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    init_logging(args.log_level.as_deref().or(config.logging.level.as_deref()));

    let mut controller = Controller::from_config(&config);
    let events = controller.events();

    #[cfg(feature = "hardware")]
    let bus = bpc_hardware::I2cBus::new()?;
    #[cfg(not(feature = "hardware"))]
    let bus = bpc_hardware::SimulatedBus::new();

    controller.connect(bus)?;
    for device in controller.devices() {
        tracing::info!(address = device.address, name = %device.name, "device on bus");
    }

    if args.slope {
        let slope = controller.read_slope(Duration::from_secs(5))?;
        if args.json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "slope",
                    "acid_pct": slope.acid,
                    "base_pct": slope.base,
                    "zero_mv": slope.zero,
                })
            );
        } else {
            println!(
                "pH slope: acid {:.1}%, base {:.1}%, zero {:.2} mV",
                slope.acid, slope.base, slope.zero
            );
        }
    }

    if let Some(dir) = config.record.directory.as_deref() {
        let path = controller.start_recording(Some(dir), config.record.label.as_deref())?;
        tracing::info!(path = %path.display(), "recording");
    }
    controller.start_charting()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        })
        .wrap_err("failed to install Ctrl-C handler")?;
    }

    let deadline = args.duration.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        if interrupted.load(Ordering::Relaxed) {
            tracing::info!("interrupted, shutting down");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::info!("duration elapsed, shutting down");
            break;
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(MonitorEvent::Sample(sample)) => print_sample(&sample, args.json),
            Ok(MonitorEvent::ChartWindow(_)) => {}
            Ok(MonitorEvent::Warning { kind, message }) => {
                tracing::warn!(?kind, %message, "recoverable fault");
            }
            Ok(MonitorEvent::FatalDisconnect { reason }) => {
                controller.disconnect()?;
                eyre::bail!("fatal disconnect: {reason}");
            }
            Err(e) if e.is_disconnected() => break,
            Err(_) => {} // timeout; re-check interrupt and deadline
        }
    }

    controller.disconnect()?;
    Ok(())
}

fn apply_overrides(config: &mut bpc_config::Config, args: &Cli) {
    if let Some(dir) = &args.record_dir {
        config.record.directory = Some(dir.clone());
    }
    if let Some(label) = &args.label {
        config.record.label = Some(label.clone());
    }
    if let Some(capacity) = args.capacity {
        config.poll.capacity = capacity;
    }
    if let Some(ms) = args.tick_interval_ms {
        config.poll.tick_interval_ms = ms;
    }
}

fn init_logging(level: Option<&str>) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_sample(sample: &Sample, json: bool) {
    if json {
        match serde_json::to_string(sample) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "sample serialization failed"),
        }
    } else {
        println!(
            "{}  pH {}  RTD {}  DO {}",
            sample.at.format("%H:%M:%S"),
            fmt(sample.ph),
            fmt(sample.temperature),
            fmt(sample.dissolved_oxygen),
        );
    }
}

fn fmt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:7.3}"),
        None => "    ---".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn cli_flags_override_config_values() {
        let mut config = bpc_config::Config::default();
        let args = Cli::parse_from([
            "bpc",
            "--record-dir",
            "/data/runs",
            "--label",
            "batch9",
            "--capacity",
            "250",
            "--tick-interval-ms",
            "500",
        ]);
        apply_overrides(&mut config, &args);
        assert_eq!(
            config.record.directory.as_deref(),
            Some(std::path::Path::new("/data/runs"))
        );
        assert_eq!(config.record.label.as_deref(), Some("batch9"));
        assert_eq!(config.poll.capacity, 250);
        assert_eq!(config.poll.tick_interval_ms, 500);
    }

    #[rstest]
    fn missing_channels_render_as_dashes() {
        assert_eq!(fmt(None), "    ---");
        assert_eq!(fmt(Some(7.0)), "  7.000");
    }
}
