//! OBDsim command line frontend
//!
//! Starts the telemetry simulation, binds the requested transports, and
//! narrates emulator events to the terminal until interrupted.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use obdsim_core::events::EmulatorEvent;
use obdsim_core::telemetry::VehicleProfile;
use obdsim_core::{Emulator, EmulatorConfig};

#[derive(Parser, Debug)]
#[command(name = "obdsim", version, about = "ELM327 OBD-II adapter emulator")]
struct Args {
    /// Serial port to emulate the adapter on (e.g. /dev/ttyUSB0)
    #[arg(long)]
    port: Option<String>,

    /// TCP address to listen on for wireless clients (e.g. 127.0.0.1:35000)
    #[arg(long)]
    listen: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = obdsim_core::config::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Vehicle profile: car or truck
    #[arg(long, default_value = "truck")]
    profile: String,

    /// Telemetry tick interval in milliseconds
    #[arg(long, default_value_t = obdsim_core::config::DEFAULT_TICK_INTERVAL_MS)]
    tick: u64,

    /// Seed for deterministic simulation runs
    #[arg(long)]
    seed: Option<u64>,

    /// Start with fault injection enabled
    #[arg(long)]
    critical: bool,

    /// Start with random DTC generation enabled
    #[arg(long)]
    dtc: bool,
}

fn parse_profile(name: &str) -> anyhow::Result<VehicleProfile> {
    match name.to_ascii_lowercase().as_str() {
        "car" => Ok(VehicleProfile::Car),
        "truck" | "heavy-truck" => Ok(VehicleProfile::HeavyTruck),
        other => anyhow::bail!("unknown profile '{other}', expected car or truck"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = EmulatorConfig {
        profile: parse_profile(&args.profile)?,
        tick_interval_ms: args.tick,
        serial_port: args.port.clone(),
        baud_rate: args.baud,
        listen_addr: args.listen.clone(),
        rng_seed: args.seed,
    };

    if config.serial_port.is_none() && config.listen_addr.is_none() {
        anyhow::bail!("nothing to bind: pass --port and/or --listen");
    }

    let mut emulator = Emulator::new(config);
    let mut events = emulator.subscribe();

    emulator.set_critical_mode(args.critical);
    emulator.set_dtc_mode(args.dtc);
    emulator.start_simulation();

    if args.port.is_some() {
        emulator.start_serial().context("serial binding failed")?;
    }
    if args.listen.is_some() {
        let addr = emulator.start_server().await.context("server bind failed")?;
        tracing::info!("listening on {addr}");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(EmulatorEvent::CommandProcessed { request, response }) => {
                    tracing::info!("{request} -> {}", response.replace('\r', " "));
                }
                Ok(EmulatorEvent::ConnectionStatusChanged(up)) => {
                    tracing::info!("connection {}", if up { "up" } else { "down" });
                }
                // Telemetry ticks and logs already reach tracing; skip them here
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event stream lagged, skipped {skipped}");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("shutting down");
    emulator.stop().await;
    Ok(())
}
