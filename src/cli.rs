//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Bidirectional serial <-> TCP byte bridge
#[derive(Parser, Debug, Default)]
#[command(name = "stcp-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (default: config.toml next to the executable)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Serial port to use (overrides config)
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Serial baud rate (overrides config)
    #[arg(long, value_name = "RATE")]
    pub baud: Option<u32>,

    /// TCP port the client connects to (default: 8888)
    #[arg(long, value_name = "PORT")]
    pub tcp_port: Option<u16>,

    /// Address to listen on (default: 127.0.0.1)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<IpAddr>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports visible to the bridge
    ListPorts,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(tcp_port) = self.tcp_port {
            config.tcp.port = tcp_port;
        }
        if let Some(bind) = self.bind {
            config.tcp.bind_address = bind;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
