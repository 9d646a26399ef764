/*!
# Mount Simulator

Simulates Wi-Fi connected alt-azimuth telescope mounts speaking the AUX
binary protocol, so planetarium and control applications can be exercised
without hardware.

## Features

- One TCP listener per simulated mount, any number of concurrent clients
- `$$$` command-mode negotiation of the serial bridge
- Fast/slow goto, jogging, guiding, backlash and cordwrap settings
- UDP discovery beacon until the first application connects
- Periodic status output as text or JSON lines

## Usage

### Defaults (or `mount-sim.toml` if present)
```bash
mount-sim
```

### Explicit settings
```bash
mount-sim run --port 2000 --devices 2 --tick-ms 50 --status-format json
```

### Generate a configuration file
```bash
mount-sim config --output mount-sim.toml
```
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod beacon;
mod cancel;
mod command_log;
mod commands;
mod config;
mod device;
mod dispatch;
mod mount;
mod server;
mod session;
mod status;

use beacon::BeaconSettings;
use cancel::CancelToken;
use config::AppConfig;
use device::{Device, DeviceSettings};
use status::{StatusFormat, StatusUpdate};

/// Queued snapshots before the tick drivers start dropping them
const STATUS_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "mount-sim")]
#[command(about = "Telescope mount simulator speaking the AUX protocol over Wi-Fi")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "mount-sim.toml")]
    config: PathBuf,

    /// Log every frame (same as RUST_LOG=debug)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the simulator
    Run {
        /// TCP port of the first device
        #[arg(short, long)]
        port: Option<u16>,

        /// Number of simulated mounts
        #[arg(short, long)]
        devices: Option<u16>,

        /// Motion integration period in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Do not broadcast discovery datagrams
        #[arg(long)]
        no_beacon: bool,

        /// Status output format
        #[arg(long, value_enum)]
        status_format: Option<StatusFormat>,

        /// Disable status output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "mount-sim.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the status output, logs go to stderr
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Some(Commands::Config { output }) => generate_config_file(output),
        Some(Commands::Run {
            port,
            devices,
            tick_ms,
            no_beacon,
            status_format,
            quiet,
        }) => {
            let mut config = load_config(&cli.config)?;
            if let Some(port) = port {
                config.simulator.port = port;
            }
            if let Some(devices) = devices {
                config.simulator.devices = devices;
            }
            if let Some(tick_ms) = tick_ms {
                config.simulator.tick_interval_ms = tick_ms;
            }
            if no_beacon {
                config.beacon.enabled = false;
            }
            if let Some(format) = status_format {
                config.status.format = format;
            }
            if quiet {
                config.status.enabled = false;
            }
            config.validate()?;
            run_simulator(config)
        }
        None => {
            let config = load_config(&cli.config)?;
            run_simulator(config)
        }
    }
}

/// Load the configuration file, falling back to defaults if it does not exist
fn load_config(path: &PathBuf) -> Result<AppConfig> {
    if path.exists() {
        let config = AppConfig::load_from_file(path)?;
        info!("📝 Loaded configuration from {}", path.display());
        Ok(config)
    } else {
        warn!("⚠️ {} not found, using defaults", path.display());
        Ok(AppConfig::new())
    }
}

/// Run every configured device until Ctrl+C
fn run_simulator(config: AppConfig) -> Result<()> {
    info!(
        "🚀 Starting {} simulated mount(s) on {}:{}",
        config.simulator.devices, config.simulator.bind_addr, config.simulator.port
    );

    let shutdown = CancelToken::new();
    let ctrlc_token = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    })?;

    let (status_tx, status_thread) = if config.status.enabled {
        let (tx, rx) = crossbeam_channel::bounded(STATUS_CHANNEL_CAPACITY);
        let format = config.status.format;
        let interval = config.status.interval();
        let handle = std::thread::Builder::new()
            .name("status-renderer".to_string())
            .spawn(move || status::status_renderer_thread(rx, format, interval))
            .context("Failed to spawn status renderer thread")?;
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let result = runtime.block_on(run_devices(&config, shutdown, status_tx));

    if let Some(handle) = status_thread {
        match handle.join() {
            Ok(Err(e)) => error!("Status renderer failed: {}", e),
            Err(_) => error!("Status renderer thread panicked"),
            Ok(Ok(())) => {}
        }
    }

    result?;
    info!("✅ Simulator stopped");
    Ok(())
}

async fn run_devices(config: &AppConfig, shutdown: CancelToken, status: Option<Sender<StatusUpdate>>) -> Result<()> {
    let mut devices = JoinSet::new();

    for index in 0..config.simulator.devices {
        let settings = DeviceSettings {
            index,
            listen_addr: config.simulator.device_addr(index)?,
            tick_interval: config.simulator.tick_interval(),
            beacon: None,
        };

        // Bind first so the beacon advertises the port actually in use
        let mut device = Device::bind(settings).await?;
        if config.beacon.enabled {
            let source = device.local_addr()?;
            device = device.with_beacon(BeaconSettings::from_config(&config.beacon, source)?);
        }

        devices.spawn(device.run(shutdown.clone(), status.clone()));
    }

    // Tick drivers own the remaining senders; the renderer exits once they stop
    drop(status);

    let mut first_error = None;
    while let Some(finished) = devices.join_next().await {
        let outcome = finished.context("Device task panicked").and_then(|result| result);
        if let Err(e) = outcome {
            error!("Device failed: {:#}", e);
            shutdown.cancel();
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   mount-sim --config {}", output_path.display());

    Ok(())
}
