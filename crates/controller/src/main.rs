//! msa-usb
//!
//! Command-line front end: loads a device roster, brings the instrument up,
//! and runs a continuous scan, printing each measurement.

use anyhow::{Context, Result};
use clap::Parser;
use common::{ControllerEvent, Transport, setup_logging};
use controller::config::ControllerConfig;
use controller::roster_file::load_roster;
use controller::usb::{HotplugWatcher, OfflineTransport, UsbInstrument};
use controller::{Instrument, Roster};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "msa-usb")]
#[command(author, version, about = "Scan controller for a USB-attached network analyzer")]
#[command(long_about = "
Programs the synthesizers of a USB-attached network analyzer over its shared
latch bus, sweeps the configured scan and reports magnitude/phase readings.

EXAMPLES:
    # Scan with the roster from the config file
    msa-usb

    # Scan a specific roster for ten seconds
    msa-usb --roster plan.toml --duration-secs 10

    # Trace the command bytes without touching hardware
    msa-usb --roster plan.toml --dry-run --log-level debug

    # List matching instruments
    msa-usb --list-devices

CONFIGURATION:
    The controller looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/msa-usb/controller.toml
    3. /etc/msa-usb/controller.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Device roster file (overrides controller.roster_path)
    #[arg(short, long, value_name = "PATH")]
    roster: Option<PathBuf>,

    /// List matching instruments and exit
    #[arg(long)]
    list_devices: bool,

    /// Never open the instrument; log the command bytes instead
    #[arg(long)]
    dry_run: bool,

    /// Sweep from the last step down
    #[arg(long)]
    inverted: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ControllerConfig::default();
        let path = ControllerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ControllerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ControllerConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.controller.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("msa-usb v{}", env!("CARGO_PKG_VERSION"));

    let transport: Box<dyn Transport> = if args.dry_run {
        info!("Dry run: commands are traced, not sent");
        Box::new(OfflineTransport)
    } else {
        match UsbInstrument::new(config.usb.settings()) {
            Ok(usb) => Box::new(usb),
            Err(e) => {
                warn!("USB unavailable ({}), running offline", e);
                Box::new(OfflineTransport)
            }
        }
    };
    let mut instrument = Instrument::new(transport, config.timing.timing());

    if args.list_devices {
        return list_devices_mode(&instrument);
    }

    let roster_path = args
        .roster
        .clone()
        .or_else(|| config.controller.roster_path())
        .context("No roster file given (use --roster or set controller.roster_path)")?;
    let mut roster = load_roster(&roster_path)?;

    let auto_connect = config.controller.auto_connect && !args.dry_run;
    if auto_connect && let Err(e) = instrument.open(config.controller.device_index) {
        warn!("Instrument not opened: {}", e);
    }

    let _hotplug = if args.dry_run {
        None
    } else {
        HotplugWatcher::spawn(config.usb.filters.clone(), instrument.event_sender())
            .context("Failed to start hot-plug watcher")?
    };

    let report = instrument
        .initialize_hardware(&mut roster)
        .context("Hardware initialization failed")?;
    info!(
        "{} pins wired, {} init writes",
        report.wired_pins,
        report.total_writes()
    );

    let mut scan = config.scan.clone();
    scan.inverted |= args.inverted;
    instrument
        .load_scan(&scan.definition(roster.scan_step_count()), &roster)
        .context("Failed to load scan")?;
    instrument.start_scanning()?;

    let session = Session {
        device_index: config.controller.device_index,
        auto_connect,
        roster,
    };
    let result = run_scan(&mut instrument, session, args.duration_secs).await;

    if let Err(e) = instrument.stop_scanning() {
        error!("Error stopping scan: {}", e);
    }
    if args.dry_run {
        println!(
            "Dry run traced {} commands",
            instrument.dry_run_records().len()
        );
    }
    instrument.close();

    info!("Controller shutdown complete");
    result
}

/// List matching instruments and exit
fn list_devices_mode(instrument: &Instrument) -> Result<()> {
    let devices = instrument
        .list_devices()
        .context("Failed to enumerate instruments")?;

    if devices.is_empty() {
        println!("No instruments found.");
    } else {
        println!("Found {} instrument(s):\n", devices.len());
        for device in devices {
            println!(
                "  [{}] {:04x}:{:04x} - {} {}",
                device.index,
                device.vendor_id,
                device.product_id,
                device
                    .manufacturer
                    .as_deref()
                    .unwrap_or("Unknown Manufacturer"),
                device.product.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03}",
                device.bus_number, device.device_address
            );
        }
    }

    Ok(())
}

struct Session {
    device_index: usize,
    auto_connect: bool,
    roster: Roster,
}

/// Print events until Ctrl+C, the duration elapses, or the channel closes
async fn run_scan(
    instrument: &mut Instrument,
    mut session: Session,
    duration_secs: Option<u64>,
) -> Result<()> {
    let events = instrument.events();
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    info!("Scanning, press Ctrl+C to stop");
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                return Ok(());
            }
            () = &mut deadline => {
                info!("Scan duration elapsed");
                return Ok(());
            }
            event = events.recv() => {
                let event = event.context("Event channel closed")?;
                handle_event(instrument, &mut session, event)?;
            }
        }
    }
}

fn handle_event(
    instrument: &mut Instrument,
    session: &mut Session,
    event: ControllerEvent,
) -> Result<()> {
    match event {
        ControllerEvent::MeasurementReady {
            step,
            magnitude,
            phase,
        } => {
            println!("{:>6} {:>10} {:>10}", step, magnitude, phase);
        }
        ControllerEvent::AdcFault { step, reason } => {
            warn!("No reading for step {}: {}", step, reason);
        }
        ControllerEvent::ScanHalted { step, reason } => {
            error!("Scan halted at step {}: {}", step, reason);
        }
        ControllerEvent::InstrumentArrived { .. }
            if session.auto_connect && !instrument.is_connected() =>
        {
            reconnect(instrument, session)?;
        }
        ControllerEvent::Connected => info!("Instrument connected"),
        ControllerEvent::Disconnected => warn!("Instrument disconnected"),
        other => info!("{:?}", other),
    }
    Ok(())
}

/// Reopen a re-plugged instrument, replay init and continue the scan
fn reconnect(instrument: &mut Instrument, session: &mut Session) -> Result<()> {
    instrument.pause()?;
    match instrument.open(session.device_index) {
        Ok(()) => {
            instrument
                .initialize_hardware(&mut session.roster)
                .context("Hardware re-initialization failed")?;
        }
        Err(e) => warn!("Reconnect failed: {}", e),
    }
    instrument.resume()?;
    Ok(())
}
