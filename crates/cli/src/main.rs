//! beacon CLI: command-line control for Delcom visual indicators.

use anyhow::{Context, Result};
use beacon_core::comm::status_from;
use beacon_core::device::{self, UsbHandle};
use beacon_core::{pids, BuzzerSettings, PinMask, Session, SessionConfig, DELCOM_VID};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// `vid:pid` in hex.
#[derive(Debug, Clone, Copy)]
struct DeviceId {
    vid: u16,
    pid: u16,
}

impl std::str::FromStr for DeviceId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (vid, pid) = s
            .split_once(':')
            .ok_or_else(|| format!("expected vid:pid, got '{s}'"))?;
        let parse = |part: &str| {
            u16::from_str_radix(part.trim_start_matches("0x"), 16)
                .map_err(|e| format!("invalid id '{part}': {e}"))
        };
        Ok(Self {
            vid: parse(vid)?,
            pid: parse(pid)?,
        })
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

#[derive(Parser)]
#[command(
    name = "beacon",
    version,
    about = "Drive a Delcom USB visual indicator"
)]
struct Cli {
    /// Device to open, as hex vid:pid.
    #[arg(long, global = true, default_value_t = DeviceId { vid: DELCOM_VID, pid: pids::VISUAL_INDICATOR })]
    device: DeviceId,

    /// JSON session config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable libusb's own debug output.
    #[arg(long, global = true)]
    libusb_debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClockAction {
    Enable,
    Disable,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected beacons.
    List,
    /// Show serial number and firmware version.
    Info,
    /// Show raw port registers.
    Ports,
    /// Check whether the device responds.
    Status,
    /// Turn LEDs on.
    On {
        /// Pins: green, red, blue, all, or a bit mask like 0b101.
        mask: PinMask,
        /// Turn them off again after this many milliseconds.
        #[arg(long = "for")]
        for_ms: Option<u64>,
    },
    /// Turn LEDs off.
    Off { mask: PinMask },
    /// Set PWM brightness (0-100).
    Intensity { mask: PinMask, pct: u8 },
    /// Set the clock generator duty cycle.
    Duty {
        mask: PinMask,
        on_ticks: u8,
        off_ticks: u8,
    },
    /// Enable or disable the clock generator on pins.
    Clock { action: ClockAction, mask: PinMask },
    /// Set the clock generator prescaler (1-255).
    Prescaler { value: u8 },
    /// Flash LEDs by repeating the "on" write.
    Flash {
        mask: PinMask,
        /// Number of repeats (default from config).
        #[arg(long)]
        repeat: Option<usize>,
    },
    /// Read and reset the button event counter, or toggle counting.
    Counter {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
    /// Control the buzzer.
    Buzzer {
        /// Silence the buzzer.
        #[arg(long)]
        stop: bool,
        /// Frequency divider.
        #[arg(long, default_value_t = 0x20)]
        frequency: u8,
        /// Repeat count, 0 for continuous.
        #[arg(long, default_value_t = 1)]
        repeat: u8,
        /// On time in 50 ms units.
        #[arg(long, default_value_t = 4)]
        on_time: u8,
        /// Off time in 50 ms units.
        #[arg(long, default_value_t = 4)]
        off_time: u8,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize + Display>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    debug!(
        device = %cli.device,
        config = ?config,
        "Resolved device and session config"
    );
    let context = device::usb_context(cli.libusb_debug)?;

    match cli.command {
        Commands::List => {
            let devices = device::discover_devices(&context)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No beacons found.");
                println!("Ensure the device is connected and a udev rule grants access.");
            } else {
                for dev in &devices {
                    println!(
                        "{} (VID: 0x{:04X}, PID: 0x{:04X}, bus {:03} address {:03})",
                        dev.model.name(),
                        dev.vid,
                        dev.pid,
                        dev.bus,
                        dev.address
                    );
                }
            }
        }
        Commands::Status => {
            let opened = Session::open_in(&context, cli.device.vid, cli.device.pid, config);
            let status = match &opened {
                Ok(session) => session.status(),
                Err(_) => status_from(&opened),
            };
            emit(cli.json, &status)?;
        }
        command => {
            let mut session = Session::open_in(&context, cli.device.vid, cli.device.pid, config)
                .with_context(|| format!("open beacon {}", cli.device))?;
            run(&mut session, command, cli.json)?;
            // Waits for a pending timed turn-off.
            session.close();
        }
    }

    Ok(())
}

fn run(session: &mut Session<UsbHandle>, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::List | Commands::Status => anyhow::bail!("command does not take a session"),
        Commands::Info => emit(json, &session.read_firmware_info()?)?,
        Commands::Ports => emit(json, &session.read_port_state()?)?,
        Commands::On { mask, for_ms } => {
            let duration = Duration::from_millis(for_ms.unwrap_or(0));
            session.turn_on_timed(mask, duration)?;
            match for_ms {
                Some(ms) => println!("LEDs {mask} on for {ms} ms"),
                None => println!("LEDs {mask} on"),
            }
        }
        Commands::Off { mask } => {
            session.turn_off(mask)?;
            println!("LEDs {mask} off");
        }
        Commands::Intensity { mask, pct } => {
            session.set_intensity(mask, pct)?;
            println!("Intensity of {mask} set to {pct}%");
        }
        Commands::Duty {
            mask,
            on_ticks,
            off_ticks,
        } => {
            session.set_duty_cycle(mask, on_ticks, off_ticks)?;
            println!("Duty cycle of {mask} set to {on_ticks}/{off_ticks}");
        }
        Commands::Clock { action, mask } => match action {
            ClockAction::Enable => {
                session.enable_clock(mask)?;
                println!("Clock enabled on {mask}");
            }
            ClockAction::Disable => {
                session.disable_clock(mask)?;
                println!("Clock disabled on {mask}");
            }
        },
        Commands::Prescaler { value } => {
            session.set_clock_prescaler(value)?;
            println!("Prescaler set to {value}");
        }
        Commands::Flash { mask, repeat } => {
            let repeat = repeat.unwrap_or(session.config().flash_repeat);
            session.flash(mask, repeat)?;
            println!("Flashed {mask} ({repeat} writes)");
        }
        Commands::Counter { enable, disable } => {
            if enable || disable {
                session.set_event_counter(enable)?;
                println!(
                    "Event counter {}",
                    if enable { "enabled" } else { "disabled" }
                );
            } else {
                emit(json, &session.read_and_reset_event_counter()?)?;
            }
        }
        Commands::Buzzer {
            stop,
            frequency,
            repeat,
            on_time,
            off_time,
        } => {
            session.set_buzzer(BuzzerSettings {
                enabled: !stop,
                frequency,
                repeat,
                on_time,
                off_time,
            })?;
            println!("Buzzer {}", if stop { "off" } else { "on" });
        }
    }
    Ok(())
}
