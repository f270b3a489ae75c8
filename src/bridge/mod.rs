//! Bridge orchestration
//!
//! Owns the serial and TCP endpoints, wires them with relay listeners and
//! runs each on its own named OS thread. Events (endpoint failures and
//! exits) are reported through a bounded channel consumed by `main`.

pub mod relay;
pub mod stats;

use self::stats::Stats;
use crate::config::Config;
use crate::constants::{ACCEPT_POLL_INTERVAL_MS, CHANNEL_CAPACITY};
use crate::endpoint::{serial, Endpoint, SerialEndpoint, State, TcpEndpoint};
use crate::error::{BridgeError, Result};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which endpoint an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Serial,
    Tcp,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Serial => "serial",
            Side::Tcp => "tcp",
        })
    }
}

/// Notification from an endpoint thread
#[derive(Debug)]
pub enum BridgeEvent {
    /// The endpoint loop ended on an I/O error
    RunError { side: Side, error: io::Error },
    /// The endpoint thread returned from `run()`
    Stopped { side: Side },
}

/// Handle to a running bridge
pub struct Bridge {
    serial: Arc<dyn Endpoint>,
    tcp: Arc<dyn Endpoint>,
    stats: Arc<Stats>,
    threads: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Open the serial device, build both endpoints from `config` and start them
    pub fn start(config: &Config) -> Result<(Self, mpsc::Receiver<BridgeEvent>)> {
        let port_name = if config.serial.port.is_empty() {
            serial::detect(&config.serial)?
        } else {
            config.serial.port.clone()
        };

        let device = serial::open(
            &port_name,
            config.serial.baud_rate,
            config.serial.read_timeout(),
        )?;
        let serial = SerialEndpoint::new(port_name.as_str(), device);
        serial.set_read_timeout(config.serial.read_timeout())?;
        serial.set_write_timeout(config.serial.write_timeout())?;
        serial.set_read_buffer_size(config.serial.read_buffer_size)?;
        serial.set_write_buffer_size(config.serial.write_buffer_size)?;
        serial.set_thread_priority(config.serial.thread_priority)?;

        let tcp_addr = SocketAddr::new(config.tcp.bind_address, config.tcp.port);
        let tcp = TcpEndpoint::with_bind_addr(tcp_addr);
        tcp.set_read_buffer_size(config.tcp.read_buffer_size)?;
        tcp.set_write_buffer_size(config.tcp.write_buffer_size)?;
        tcp.set_thread_priority(config.tcp.thread_priority)?;

        info!(
            "Starting bridge: {} @ {} baud <-> TCP {}",
            port_name, config.serial.baud_rate, tcp_addr
        );

        Self::with_endpoints(Arc::new(serial), Arc::new(tcp))
    }

    /// Wire two configured endpoints together and run each on its own thread
    pub fn with_endpoints(
        serial: Arc<dyn Endpoint>,
        tcp: Arc<dyn Endpoint>,
    ) -> Result<(Self, mpsc::Receiver<BridgeEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stats = Arc::new(Stats::new());

        relay::wire(&serial, &tcp, &stats, &events_tx);

        let mut bridge = Self {
            serial,
            tcp,
            stats,
            threads: Vec::with_capacity(2),
        };

        for side in [Side::Serial, Side::Tcp] {
            let endpoint = bridge.endpoint(side).clone();
            match spawn_endpoint(side, endpoint, events_tx.clone()) {
                Ok(handle) => bridge.threads.push(handle),
                Err(e) => {
                    bridge.shutdown();
                    return Err(e);
                }
            }
        }

        Ok((bridge, events_rx))
    }

    fn endpoint(&self, side: Side) -> &Arc<dyn Endpoint> {
        match side {
            Side::Serial => &self.serial,
            Side::Tcp => &self.tcp,
        }
    }

    /// Request both endpoints to stop
    pub fn stop(&self) {
        self.serial.stop();
        self.tcp.stop();
    }

    /// Wait for both endpoint threads to return
    pub fn join(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Endpoint thread panicked");
            }
        }
    }

    /// Stop both endpoints and wait for their threads
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    /// `stop()` is repeated until every thread has returned: a thread that
    /// had not yet entered `run()` when first asked would otherwise miss it.
    fn stop_and_join(&mut self) {
        let poll = Duration::from_millis(ACCEPT_POLL_INTERVAL_MS);
        loop {
            self.stop();
            if self.threads.iter().all(|t| t.is_finished()) {
                break;
            }
            thread::sleep(poll);
        }
        self.join();
        debug!("Bridge shut down");
    }

    /// Current (serial, tcp) lifecycle phases
    pub fn states(&self) -> (State, State) {
        (self.serial.state(), self.tcp.state())
    }

    /// Traffic statistics
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop_and_join();
        }
    }
}

fn spawn_endpoint(
    side: Side,
    endpoint: Arc<dyn Endpoint>,
    events: mpsc::Sender<BridgeEvent>,
) -> Result<JoinHandle<()>> {
    let name = format!("stcp-{}", side);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            if let Err(e) = endpoint.run() {
                warn!(%side, error = %e, "Endpoint did not start");
            }
            info!(%side, "Endpoint stopped");
            if let Err(e) = events.try_send(BridgeEvent::Stopped { side }) {
                debug!(%side, error = %e, "Bridge event not delivered");
            }
        })
        .map_err(|source| BridgeError::ThreadSpawn { name, source })
}
