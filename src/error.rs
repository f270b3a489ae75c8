//! Centralized error types for the bridge
//!
//! All synchronous bridge errors are represented by the `BridgeError` enum.
//! Failures inside a running endpoint loop are plain `std::io::Error`s and are
//! delivered through `Listener::on_run_error` instead.
//! Use `Result<T>` as shorthand for `std::result::Result<T, BridgeError>`.

use crate::endpoint::State;
use std::fmt;
use std::path::PathBuf;

/// All bridge errors
#[derive(Debug)]
pub enum BridgeError {
    // === Lifecycle ===
    /// Operation not allowed in the endpoint's current state
    IllegalState {
        operation: &'static str,
        state: State,
    },

    // === Buffers ===
    /// `write_async` would overflow the pending write buffer
    WriteCapacityExceeded { requested: usize, remaining: usize },
    /// Write buffer resize would not fit the bytes already pending
    BufferTooSmall { requested: usize, pending: usize },

    // === Config ===
    /// Failed to read the config file
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Serial ===
    /// Failed to open serial port
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Failed to enumerate serial ports
    SerialEnumerate { source: std::io::Error },
    /// No USB serial device found matching configuration
    NoDeviceFound,

    // === Runtime ===
    /// Failed to spawn an endpoint thread
    ThreadSpawn {
        name: String,
        source: std::io::Error,
    },
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. }
            | Self::SerialOpen { source, .. }
            | Self::SerialEnumerate { source }
            | Self::ThreadSpawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalState { operation, state } => {
                write!(f, "Cannot {} while endpoint is {}", operation, state)
            }
            Self::WriteCapacityExceeded {
                requested,
                remaining,
            } => write!(
                f,
                "Write buffer overflow: {} bytes submitted, {} bytes free",
                requested, remaining
            ),
            Self::BufferTooSmall { requested, pending } => write!(
                f,
                "Write buffer of {} bytes cannot hold {} pending bytes",
                requested, pending
            ),
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::SerialOpen { port, .. } => write!(f, "Cannot open serial port: {}", port),
            Self::SerialEnumerate { source } => {
                write!(f, "Cannot enumerate serial ports: {}", source)
            }
            Self::NoDeviceFound => write!(f, "No USB serial device found"),
            Self::ThreadSpawn { name, .. } => write!(f, "Cannot spawn thread {}", name),
        }
    }
}

/// Alias for Result with BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_state_message() {
        let err = BridgeError::IllegalState {
            operation: "run",
            state: State::Running,
        };
        assert_eq!(err.to_string(), "Cannot run while endpoint is RUNNING");
    }

    #[test]
    fn test_source_is_exposed_for_io_variants() {
        use std::error::Error;

        let err = BridgeError::SerialOpen {
            port: "/dev/ttyACM0".into(),
            source: std::io::Error::other("busy"),
        };
        assert!(err.source().is_some());
        assert!(BridgeError::NoDeviceFound.source().is_none());
    }
}
