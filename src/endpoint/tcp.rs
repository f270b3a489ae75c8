//! TCP endpoint: single-client bridge server
//!
//! Listens on a port, accepts exactly one client per `run()`, then pumps
//! bytes over that connection until stopped or the connection fails.
//!
//! The loop never blocks on read while data is queued for writing: each
//! step peeks the socket without blocking and only reads when at least one
//! byte is available. `stop()` shuts the connection down to unblock an
//! in-flight write or read.

use super::pump::{Link, Pump};
use super::{Endpoint, Listener, State, ThreadPriority};
use crate::constants::{
    ACCEPT_POLL_INTERVAL_MS, LISTEN_RECV_BUFFER_SIZE, MAX_SOCKET_RETRY_ATTEMPTS,
    RETRY_BASE_DELAY_MS,
};
use crate::error::Result;
use crate::platform;
use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Single-client TCP endpoint
///
/// # Example
///
/// ```ignore
/// let tcp = Arc::new(TcpEndpoint::new(8888));
/// tcp.set_read_buffer_size(2048)?;
/// tcp.set_write_buffer_size(2048)?;
/// tcp.set_listener(Some(listener));
///
/// let runner = tcp.clone();
/// std::thread::spawn(move || runner.run());
///
/// tcp.write_async(b"hello")?;
/// // ...
/// tcp.stop();
/// ```
pub struct TcpEndpoint {
    bind_addr: SocketAddr,
    pump: Pump,
    /// Clone of the accepted stream, kept so `stop()` can shut it down
    connection: Mutex<Option<TcpStream>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TcpEndpoint {
    /// Create an endpoint listening on `127.0.0.1:port`
    pub fn new(port: u16) -> Self {
        Self::with_bind_addr(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Create an endpoint listening on an explicit address
    ///
    /// Port 0 lets the OS choose; see `local_addr()`.
    pub fn with_bind_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            pump: Pump::new("tcp", ThreadPriority::Highest),
            connection: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Configured listening address
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Address actually bound, while the run loop owns a listening socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn read_buffer_size(&self) -> usize {
        self.pump.read_buffer_size()
    }

    pub fn write_buffer_size(&self) -> usize {
        self.pump.write_buffer_size()
    }

    /// Copy of the bytes queued for the next step
    pub fn pending_writes(&self) -> Bytes {
        self.pump.pending_writes()
    }

    /// Bind, wait for one client, then pump until stopped
    fn serve(&self) -> io::Result<()> {
        let listener = bind_listener(self.bind_addr)?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);
        info!(endpoint = self.pump.name(), %addr, "Waiting for client");

        let Some(stream) = self.accept(&listener)? else {
            return Ok(());
        };
        // One peer per run: later connection attempts are refused
        drop(listener);

        configure_stream(
            &stream,
            self.pump.read_buffer_size(),
            self.pump.write_buffer_size(),
        )?;
        *self.connection.lock() = Some(stream.try_clone()?);

        // stop() may have run before the connection was published
        if !self.pump.is_running() {
            return Ok(());
        }

        let priority = self.pump.thread_priority();
        if let Err(e) = platform::set_thread_priority(priority) {
            debug!(endpoint = self.pump.name(), ?priority, error = %e, "Thread priority not applied");
        }

        info!(endpoint = self.pump.name(), "Running ...");
        let mut link = TcpLink { stream };
        self.pump.serve(&mut link)
    }

    /// Poll for a client until one connects or the endpoint stops running
    fn accept(&self, listener: &TcpListener) -> io::Result<Option<TcpStream>> {
        let poll = Duration::from_millis(ACCEPT_POLL_INTERVAL_MS);
        loop {
            if !self.pump.is_running() {
                return Ok(None);
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!(endpoint = self.pump.name(), %peer, "Client connected");
                    // Some platforms hand out accepted sockets in the listener's mode
                    stream.set_nonblocking(false)?;
                    return Ok(Some(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(poll),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn close_connection(&self) {
        if let Some(stream) = self.connection.lock().take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!(endpoint = self.pump.name(), error = %e, "Close failed");
            }
        }
        *self.local_addr.lock() = None;
    }
}

impl Endpoint for TcpEndpoint {
    fn set_listener(&self, listener: Option<Arc<dyn Listener>>) {
        self.pump.set_listener(listener);
    }

    fn listener(&self) -> Option<Arc<dyn Listener>> {
        self.pump.listener()
    }

    fn set_read_buffer_size(&self, size: usize) -> Result<()> {
        self.pump.set_read_buffer_size(size)
    }

    fn set_write_buffer_size(&self, size: usize) -> Result<()> {
        self.pump.set_write_buffer_size(size)
    }

    fn set_thread_priority(&self, priority: ThreadPriority) -> Result<()> {
        self.pump.set_thread_priority(priority)
    }

    fn write_async(&self, data: &[u8]) -> Result<()> {
        self.pump.write_async(data)
    }

    fn state(&self) -> State {
        self.pump.state()
    }

    fn stop(&self) {
        self.pump.request_stop(|| {
            if let Some(stream) = self.connection.lock().as_ref() {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    debug!(endpoint = self.pump.name(), error = %e, "Shutdown failed");
                }
            }
        });
    }

    fn run(&self) -> Result<()> {
        self.pump.begin_run()?;
        let result = self.serve();
        self.pump.finish_run(result, || self.close_connection());
        Ok(())
    }
}

/// Accepted connection as seen by the pump
struct TcpLink {
    stream: TcpStream,
}

impl Link for TcpLink {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    fn has_pending_input(&mut self) -> io::Result<bool> {
        let mut probe = [0u8; 1];
        self.stream.set_nonblocking(true)?;
        let peeked = self.stream.peek(&mut probe);
        self.stream.set_nonblocking(false)?;

        match peeked {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "peer closed the connection",
            )),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

/// Create the passive socket with SO_REUSEADDR for quick rebind
///
/// Retries a few times if the port is still in use (e.g., from previous run).
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    for attempt in 0..MAX_SOCKET_RETRY_ATTEMPTS {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_recv_buffer_size(LISTEN_RECV_BUFFER_SIZE)?;

        match socket.bind(&addr.into()) {
            Ok(()) => {
                socket.listen(1)?;
                socket.set_nonblocking(true)?;
                return Ok(socket.into());
            }
            Err(_) if attempt < MAX_SOCKET_RETRY_ATTEMPTS - 1 => {
                // Exponential backoff: 200ms, 400ms, 800ms, 1600ms
                std::thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
            }
            Err(e) => {
                return Err(io::Error::new(
                    e.kind(),
                    format!("cannot bind {}: {}", addr, e),
                ))
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrInUse,
        format!("cannot bind {}: failed after retries", addr),
    ))
}

/// Size kernel buffers from the endpoint's configuration
fn configure_stream(stream: &TcpStream, read_size: usize, write_size: usize) -> io::Result<()> {
    let socket = SockRef::from(stream);
    socket.set_recv_buffer_size(read_size)?;
    socket.set_send_buffer_size(write_size)?;
    stream.set_nodelay(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn test_tcp_endpoint_new_binds_loopback() {
        let tcp = TcpEndpoint::new(8888);
        assert_eq!(tcp.bind_addr(), "127.0.0.1:8888".parse::<SocketAddr>().unwrap());
        assert_eq!(tcp.state(), State::Stopped);
        assert!(tcp.local_addr().is_none());
    }

    #[test]
    fn test_write_buffer_resize_preserves_pending() {
        let tcp = TcpEndpoint::new(0);
        tcp.write_async(b"queued").unwrap();
        tcp.set_write_buffer_size(64).unwrap();

        assert_eq!(tcp.write_buffer_size(), 64);
        assert_eq!(tcp.pending_writes().as_ref(), b"queued");
    }

    #[test]
    fn test_write_async_overflow_keeps_contents() {
        let tcp = TcpEndpoint::new(0);
        tcp.set_write_buffer_size(3).unwrap();
        tcp.write_async(&[1, 2, 3]).unwrap();

        let err = tcp.write_async(&[4]).unwrap_err();
        assert!(matches!(err, BridgeError::WriteCapacityExceeded { .. }));
        assert_eq!(tcp.pending_writes().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let tcp = TcpEndpoint::new(0);
        tcp.stop();
        assert_eq!(tcp.state(), State::Stopped);
    }

    #[test]
    fn test_bind_listener_reports_address() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
