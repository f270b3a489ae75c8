//! Serial <-> TCP byte bridge
//!
//! Relays raw bytes between a serial device (typically a USB autopilot link)
//! and a single TCP client, unmodified and in order per direction.
//!
//! - `endpoint`: the serial and TCP endpoints and their shared run loop
//! - `bridge`: relay wiring and the orchestrator that runs both endpoints
//! - `config`, `cli`, `logging`: ambient setup used by the `stcp-bridge` binary

pub mod bridge;
pub mod cli;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod logging;
mod platform;

pub use bridge::{Bridge, BridgeEvent, Side};
pub use endpoint::{Endpoint, Listener, SerialEndpoint, State, TcpEndpoint, ThreadPriority};
pub use error::{BridgeError, Result};
