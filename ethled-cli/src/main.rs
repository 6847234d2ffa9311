use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ethled_lib::bus::{Bus, MemoryBus};
use ethled_lib::timing::{Delay, ThreadDelay};
use ethled_lib::{Color, Indicator, LedController};
use tracing::info;

/// Inspect and drive the NAS front-panel LEDs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use an emulated controller instead of the hardware.
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the state reported by the controller.
    Status {
        /// Only this indicator (power, network, slot1..slot8).
        #[arg(short, long)]
        indicator: Option<Indicator>,
    },
    /// Change one indicator.
    Set {
        indicator: Indicator,
        #[command(subcommand)]
        mode: Mode,
    },
    /// Switch off every utilization LED and the power LED.
    Off,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Steady light.
    On {
        /// Color name or #rrggbb.
        #[arg(short, long, default_value = "white")]
        color: Color,
        #[arg(short, long, default_value_t = 255)]
        brightness: u8,
    },
    Off,
    Blink {
        #[arg(long, default_value_t = 500)]
        on_ms: u16,
        #[arg(long, default_value_t = 500)]
        off_ms: u16,
    },
    Breath {
        #[arg(long, default_value_t = 1000)]
        on_ms: u16,
        #[arg(long, default_value_t = 1000)]
        off_ms: u16,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    if cli.dry_run {
        let mut led = LedController::new(MemoryBus::new(), ThreadDelay);
        execute(&mut led, &cli.command)
    } else {
        let mut led = LedController::bind().context("Failed to open LED controller")?;
        println!("Connected to LED controller");
        execute(&mut led, &cli.command)
    }
}

fn execute<B: Bus, D: Delay>(led: &mut LedController<B, D>, action: &Action) -> Result<()> {
    match action {
        Action::Status { indicator } => {
            let indicators = match indicator {
                Some(one) => vec![*one],
                None => Indicator::DRIVEN.to_vec(),
            };
            print_status(led, &indicators)
        }
        Action::Set { indicator, mode } => {
            set(led, *indicator, mode).with_context(|| format!("Failed to set {} LED", indicator))?;
            info!("{} LED updated", indicator);
            Ok(())
        }
        Action::Off => {
            led.turn_off_all().context("Failed to turn off all LEDs")?;
            println!("All LEDs off");
            Ok(())
        }
    }
}

fn set<B: Bus, D: Delay>(led: &mut LedController<B, D>, indicator: Indicator, mode: &Mode) -> Result<()> {
    match *mode {
        Mode::On { color, brightness } => led.activate(indicator, color, brightness)?,
        Mode::Off => led.deactivate(indicator)?,
        Mode::Blink { on_ms, off_ms } => led.set_blink(indicator, on_ms, off_ms)?,
        Mode::Breath { on_ms, off_ms } => led.set_breath(indicator, on_ms, off_ms)?,
    }
    Ok(())
}

fn print_status<B: Bus, D: Delay>(led: &mut LedController<B, D>, indicators: &[Indicator]) -> Result<()> {
    let mut failed = 0;
    for &indicator in indicators {
        match led.read_status(indicator).and_then(|block| block.decode()) {
            Ok(status) => println!("{:>8}: {}", indicator.to_string(), status),
            Err(e) => {
                println!("{:>8}: <{}>", indicator.to_string(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} status reads failed", failed, indicators.len());
    }
    Ok(())
}
