use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info, warn};

use ethled_lib::bus::Bus;
use ethled_lib::sampler::Sampler;
use ethled_lib::state::{StateManager, Tier};
use ethled_lib::timing::ThreadDelay;
use ethled_lib::LedController;

mod config;
mod dry_run;
mod logging;
mod monitor;

use config::Config;
use dry_run::DryRunBus;
use monitor::{Monitor, Shutdown, run_test_mode};

/// Shows network link utilization on the NAS front-panel LEDs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cycle through every utilization tier instead of monitoring.
    #[arg(short, long)]
    test: bool,
    /// Emulate the LED controller and log the frames instead of sending them.
    #[arg(long)]
    dry_run: bool,
    /// Configuration file. Defaults to ./ethled.toml, then /etc/ethled.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Polling interval in milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    /// Write an example configuration file to this path and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.write_config {
        Config::init(path)?;
        println!("Wrote example configuration to {}", path.display());
        return Ok(());
    }

    let (config, source) = Config::load(cli.config.as_deref())?;
    let level = if cli.verbose.is_present() {
        cli.verbose.tracing_level_filter()
    } else {
        config.level_filter()?
    };
    let guard = logging::setup_logging(cli.log_file.as_deref(), level)?;

    match &source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    info!(
        "LED control service starting (interface: {}, capacity: {} Mbps, brightness: {}, thresholds: {}/{}/{}%)",
        config.network.interface,
        config.network.capacity_mbps,
        config.leds.brightness,
        config.leds.low_threshold,
        config.leds.medium_threshold,
        config.leds.high_threshold
    );

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(forward_signals(trigger));

    let result = if cli.dry_run {
        info!("Dry run: LED commands are emulated, not sent");
        run(LedController::new(DryRunBus::new(), ThreadDelay), &cli, &config, shutdown).await
    } else {
        match LedController::bind() {
            Ok(controller) => run(controller, &cli, &config, shutdown).await,
            Err(e) => {
                error!("Check for root permissions, a loaded i2c-dev module and compatible hardware");
                Err(anyhow::Error::new(e).context("Failed to initialize LED controller"))
            }
        }
    };

    let code = match result {
        Ok(()) => {
            info!("LED control service stopped");
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    // flush the file writer before exiting
    drop(guard);
    process::exit(code)
}

/// Requests shutdown on the first SIGINT, SIGTERM or SIGHUP.
async fn forward_signals(trigger: watch::Sender<bool>) {
    match wait_for_signal().await {
        Ok(name) => info!("Received {}, shutting down gracefully", name),
        Err(e) => error!("Signal handling failed, shutting down: {}", e),
    }
    let _ = trigger.send(true);
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let name = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            "SIGINT"
        }
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    };
    Ok(name)
}

/// Lights the idle layout, runs the selected mode, then switches every LED
/// off regardless of how the mode ended.
async fn run<B: Bus>(
    controller: LedController<B, ThreadDelay>,
    cli: &Cli,
    config: &Config,
    mut shutdown: Shutdown,
) -> Result<()> {
    let interval = Duration::from_millis(cli.interval_ms);
    let mut state = StateManager::new(controller, config.thresholds(), config.leds.brightness);
    if let Err(e) = state.force(Tier::Idle) {
        warn!("Failed to set initial LED state: {}", e);
    }

    let (outcome, mut state) = if cli.test {
        let outcome = run_test_mode(&mut state, interval, &mut shutdown).await;
        (outcome, state)
    } else {
        let mut sampler = Sampler::new(&config.network.interface, f64::from(config.network.capacity_mbps));
        match sampler.initialize() {
            Ok(()) => {
                let mut monitor = Monitor::new(sampler, state, interval);
                let outcome = monitor.run(&mut shutdown).await;
                (outcome, monitor.into_state())
            }
            Err(e) => {
                let outcome = Err(anyhow::Error::new(e).context(format!(
                    "Failed to initialize bandwidth monitor; check that interface {} exists and is up",
                    config.network.interface
                )));
                (outcome, state)
            }
        }
    };

    info!("Turning off all LEDs before shutdown");
    match state.controller_mut().turn_off_all() {
        Ok(()) => info!("All LEDs turned off"),
        Err(e) => warn!("Failed to turn off all LEDs: {}", e),
    }
    outcome
}
