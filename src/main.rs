//! stcp-bridge - Serial to TCP byte bridge
//!
//! Usage:
//!   stcp-bridge                      Run with config.toml next to the executable
//!   stcp-bridge --config bridge.toml Run with an explicit config file
//!   stcp-bridge --port /dev/ttyACM0  Override the serial port
//!   stcp-bridge list-ports           List serial ports and exit

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serial_tcp_bridge::bridge::{Bridge, BridgeEvent};
use serial_tcp_bridge::cli::{Cli, Command};
use serial_tcp_bridge::config::{self, Config};
use serial_tcp_bridge::constants::STATS_LOG_INTERVAL_SECS;
use serial_tcp_bridge::logging;
use serialport::SerialPortType;
use std::time::Duration;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    if let Some(Command::ListPorts) = cli.command {
        return list_ports();
    }

    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config))
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(info) => println!(
                "{}  USB {:04x}:{:04x}  {}",
                port.port_name,
                info.vid,
                info.pid,
                info.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

async fn run_headless(config: Config) -> Result<()> {
    let (bridge, mut events) = Bridge::start(&config)?;
    let stats = bridge.stats().clone();

    let mut ticker = tokio::time::interval(Duration::from_secs(STATS_LOG_INTERVAL_SECS));
    let mut failure: Option<anyhow::Error> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                match res {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => failure = Some(e.context("signal handler setup failed")),
                }
                break;
            }
            event = events.recv() => match event {
                Some(BridgeEvent::RunError { side, error }) => {
                    failure.get_or_insert_with(|| anyhow!("{} endpoint failed: {}", side, error));
                }
                Some(BridgeEvent::Stopped { side }) => {
                    warn!(%side, "Endpoint exited, stopping bridge");
                    break;
                }
                None => break,
            },
            _ = ticker.tick() => {
                let (serial_rate, tcp_rate) = stats.update_rates();
                debug!(
                    "serial->tcp {:.1} KB/s, tcp->serial {:.1} KB/s",
                    serial_rate, tcp_rate
                );
            }
        }
    }

    // Joining blocks until both loops have observed stop()
    tokio::task::spawn_blocking(move || bridge.shutdown()).await?;

    info!(
        "Bridge stopped: {} bytes serial->tcp, {} bytes tcp->serial, {} dropped",
        stats.from_serial_bytes(),
        stats.from_tcp_bytes(),
        stats.dropped_bytes()
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
