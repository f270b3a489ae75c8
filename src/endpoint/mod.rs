//! Endpoint abstraction for byte-level relaying
//!
//! An endpoint owns one side of the bridge (serial device or TCP socket):
//! - **Lifecycle**: STOPPED → RUNNING → STOPPING → STOPPED
//! - **Write buffer**: bytes queued by `write_async`, flushed once per step
//! - **Read buffer**: scratch space for one read, handed to the listener
//!
//! Each endpoint runs its loop on a dedicated blocking thread via `run()`.
//! Endpoints never talk to each other directly: the relay installs a
//! `Listener` on one side that calls `write_async` on the other.
//!
//! # Adding a new endpoint
//!
//! 1. Create `endpoint/my_endpoint.rs`
//! 2. Implement `pump::Link` for the underlying I/O handle
//! 3. Implement the `Endpoint` trait on top of a `Pump`
//! 4. Add `pub mod my_endpoint;` here

mod buffer;
mod pump;
pub mod serial;
pub mod tcp;

pub use serial::{SerialEndpoint, SerialIo};
pub use tcp::TcpEndpoint;

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::Arc;

/// Endpoint lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Stopped => "STOPPED",
            State::Running => "RUNNING",
            State::Stopping => "STOPPING",
        };
        f.write_str(name)
    }
}

/// Scheduling hint applied to the endpoint thread when its loop starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThreadPriority {
    /// Leave the thread at its inherited priority
    #[default]
    Normal,
    /// Above normal
    High,
    /// Highest priority the platform grants without realtime scheduling
    Highest,
}

/// Receiver of endpoint events
///
/// Both callbacks run synchronously on the endpoint's I/O thread, so they
/// must not block for long.
pub trait Listener: Send + Sync {
    /// Called with exactly the bytes of every successful read
    fn on_new_data(&self, data: Bytes);

    /// Called at most once per `run()`, when the loop ends on an I/O error
    ///
    /// Never called after a shutdown requested through `stop()`.
    fn on_run_error(&self, error: io::Error);
}

/// Common contract of the serial and TCP endpoints
///
/// Configuration methods (`set_*_buffer_size`, `set_thread_priority`) only
/// succeed while the endpoint is STOPPED.
pub trait Endpoint: Send + Sync + 'static {
    /// Replace the listener; `None` detaches it
    fn set_listener(&self, listener: Option<Arc<dyn Listener>>);

    /// Currently attached listener
    fn listener(&self) -> Option<Arc<dyn Listener>>;

    /// Reallocate the read buffer (maximum size of a single read)
    fn set_read_buffer_size(&self, size: usize) -> Result<()>;

    /// Reallocate the write buffer, keeping bytes already queued
    fn set_write_buffer_size(&self, size: usize) -> Result<()>;

    /// Set the priority hint applied when the loop starts
    fn set_thread_priority(&self, priority: ThreadPriority) -> Result<()>;

    /// Queue bytes for the next step without blocking
    ///
    /// # Errors
    ///
    /// `WriteCapacityExceeded` if `data` does not fit in the remaining
    /// write buffer space. Nothing is queued in that case.
    fn write_async(&self, data: &[u8]) -> Result<()>;

    /// Current lifecycle phase
    fn state(&self) -> State;

    /// Request shutdown of a running loop; no-op otherwise
    fn stop(&self);

    /// Run the endpoint loop on the calling thread until stopped or failed
    ///
    /// # Errors
    ///
    /// `IllegalState` if the endpoint is not STOPPED. I/O failures of the
    /// loop itself are reported through `Listener::on_run_error`, not here.
    fn run(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(State::Stopped.to_string(), "STOPPED");
        assert_eq!(State::Running.to_string(), "RUNNING");
        assert_eq!(State::Stopping.to_string(), "STOPPING");
    }

    #[test]
    fn test_thread_priority_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            priority: ThreadPriority,
        }

        let parsed: Wrapper = toml::from_str("priority = \"highest\"").unwrap();
        assert_eq!(parsed.priority, ThreadPriority::Highest);

        let text = toml::to_string(&Wrapper {
            priority: ThreadPriority::High,
        })
        .unwrap();
        assert!(text.contains("priority = \"high\""));
    }
}
