//! Relay wiring between the two endpoints
//!
//! Each endpoint gets a `RelayListener` that forwards every chunk it reads
//! to the other endpoint's write buffer, untouched.
//!
//! Listeners hold their peer weakly: each endpoint owns the other's listener,
//! so strong references would keep both endpoints (and the serial port) alive
//! after the bridge is gone.

use super::stats::Stats;
use super::{BridgeEvent, Side};
use crate::endpoint::{Endpoint, Listener};
use bytes::Bytes;
use std::io;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Listener installed on one endpoint, writing into its peer
pub struct RelayListener {
    source: Side,
    peer: Weak<dyn Endpoint>,
    stats: Arc<Stats>,
    events: mpsc::Sender<BridgeEvent>,
}

impl RelayListener {
    pub fn new(
        source: Side,
        peer: Arc<dyn Endpoint>,
        stats: Arc<Stats>,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        Self {
            source,
            peer: Arc::downgrade(&peer),
            stats,
            events,
        }
    }

    fn count(&self, len: usize) {
        match self.source {
            Side::Serial => self.stats.add_from_serial(len),
            Side::Tcp => self.stats.add_from_tcp(len),
        }
    }
}

impl Listener for RelayListener {
    fn on_new_data(&self, data: Bytes) {
        let len = data.len();
        let Some(peer) = self.peer.upgrade() else {
            debug!(from = %self.source, len, "Peer endpoint gone, dropping chunk");
            self.stats.add_dropped(len);
            return;
        };
        match peer.write_async(&data) {
            Ok(()) => {
                debug!(from = %self.source, len, "Relayed");
                self.count(len);
            }
            Err(e) => {
                // Peer is full or not draining; the chunk is lost, the relay goes on
                warn!(from = %self.source, len, error = %e, "Dropped chunk");
                self.stats.add_dropped(len);
            }
        }
    }

    fn on_run_error(&self, error: io::Error) {
        warn!(side = %self.source, error = %error, "Endpoint failed");
        if let Err(e) = self.events.try_send(BridgeEvent::RunError {
            side: self.source,
            error,
        }) {
            debug!(side = %self.source, error = %e, "Bridge event not delivered");
        }
    }
}

/// Install a relay listener on each endpoint, pointing at the other
pub fn wire(
    serial: &Arc<dyn Endpoint>,
    tcp: &Arc<dyn Endpoint>,
    stats: &Arc<Stats>,
    events: &mpsc::Sender<BridgeEvent>,
) {
    serial.set_listener(Some(Arc::new(RelayListener::new(
        Side::Serial,
        tcp.clone(),
        stats.clone(),
        events.clone(),
    ))));
    tcp.set_listener(Some(Arc::new(RelayListener::new(
        Side::Tcp,
        serial.clone(),
        stats.clone(),
        events.clone(),
    ))));
}
