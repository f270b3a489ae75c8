//! Configuration management
//!
//! Config file is stored next to the executable as `config.toml`,
//! or passed explicitly with `--config`.

use crate::constants::{
    BRIDGE_BUFFER_SIZE, DEFAULT_BAUD_RATE, DEFAULT_SERIAL_TIMEOUT_MS, DEFAULT_TCP_PORT,
};
use crate::endpoint::ThreadPriority;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub tcp: TcpConfig,
}

// =============================================================================
// Serial Side
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port name (empty = first USB serial device)
    pub port: String,

    /// Line speed; the link always runs 8N1
    pub baud_rate: u32,

    /// USB Vendor ID restricting auto-detection (optional)
    pub vid: Option<u16>,

    /// Accepted USB Product IDs (empty = any PID of `vid`)
    pub pid_list: Vec<u16>,

    /// Upper bound of a single read (milliseconds)
    pub read_timeout_ms: u64,

    /// Upper bound of a single write (milliseconds)
    pub write_timeout_ms: u64,

    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub thread_priority: ThreadPriority,
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            vid: None,
            pid_list: Vec::new(),
            read_timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
            read_buffer_size: BRIDGE_BUFFER_SIZE,
            write_buffer_size: BRIDGE_BUFFER_SIZE,
            thread_priority: ThreadPriority::High,
        }
    }
}

// =============================================================================
// TCP Side
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Interface to listen on (loopback keeps the bridge local)
    pub bind_address: IpAddr,

    /// Port the telemetry client connects to
    pub port: u16,

    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub thread_priority: ThreadPriority,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_TCP_PORT,
            read_buffer_size: BRIDGE_BUFFER_SIZE,
            write_buffer_size: BRIDGE_BUFFER_SIZE,
            thread_priority: ThreadPriority::Highest,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

impl Config {
    /// Reject values the endpoints would refuse at startup
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("serial.baud_rate", self.serial.baud_rate as u64),
            ("serial.read_timeout_ms", self.serial.read_timeout_ms),
            ("serial.write_timeout_ms", self.serial.write_timeout_ms),
            ("serial.read_buffer_size", self.serial.read_buffer_size as u64),
            ("serial.write_buffer_size", self.serial.write_buffer_size as u64),
            ("tcp.read_buffer_size", self.tcp.read_buffer_size as u64),
            ("tcp.write_buffer_size", self.tcp.write_buffer_size as u64),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(BridgeError::ConfigValidation {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if !self.serial.pid_list.is_empty() && self.serial.vid.is_none() {
            return Err(BridgeError::ConfigValidation {
                field: "serial.pid_list",
                reason: "requires serial.vid".into(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the config file path (next to the executable)
pub fn config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| BridgeError::ConfigRead {
        path: PathBuf::from("executable"),
        source: e,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| BridgeError::ConfigValidation {
        field: "exe_path",
        reason: "no parent directory".into(),
    })?;
    Ok(exe_dir.join("config.toml"))
}

/// Load config from the default location, falling back to defaults
pub fn load() -> Config {
    let path = match config_path() {
        Ok(p) => p,
        Err(e) => {
            warn!("Failed to determine config path: {}, using defaults", e);
            return Config::default();
        }
    };

    if !path.exists() {
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            Config::default()
        }
    }
}

/// Load config from an explicit path
///
/// Unlike `load()`, errors are returned instead of falling back to defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| BridgeError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse(&content)
}

/// Parse config from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| BridgeError::ConfigValidation {
        field: "config",
        reason: e.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
