//! Run loop shared by all endpoints
//!
//! `Pump` holds the three independent critical sections of an endpoint:
//! - lifecycle (state, listener, priority hint)
//! - read buffer (locked for the duration of one read)
//! - write buffer (locked only to queue or drain bytes)
//!
//! The I/O itself is abstracted by `Link`, so the serial and TCP endpoints
//! run the exact same step algorithm.

use super::buffer::WriteBuffer;
use super::{Listener, State, ThreadPriority};
use crate::constants::{DEFAULT_BUFFER_SIZE, IDLE_POLL_INTERVAL_MS};
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Byte-level I/O handle driven by the pump
pub(crate) trait Link {
    /// Blocking write of the whole slice
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Non-blocking check for at least one readable byte
    fn has_pending_input(&mut self) -> io::Result<bool>;

    /// Blocking read into `buf`; `Ok(0)` means no data this time
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

struct Lifecycle {
    state: State,
    listener: Option<Arc<dyn Listener>>,
    priority: ThreadPriority,
}

pub(crate) struct Pump {
    name: &'static str,
    lifecycle: Mutex<Lifecycle>,
    read_buffer: Mutex<Vec<u8>>,
    write_buffer: Mutex<WriteBuffer>,
}

impl Pump {
    pub fn new(name: &'static str, priority: ThreadPriority) -> Self {
        Self {
            name,
            lifecycle: Mutex::new(Lifecycle {
                state: State::Stopped,
                listener: None,
                priority,
            }),
            read_buffer: Mutex::new(vec![0; DEFAULT_BUFFER_SIZE]),
            write_buffer: Mutex::new(WriteBuffer::with_capacity(DEFAULT_BUFFER_SIZE)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn state(&self) -> State {
        self.lifecycle.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == State::Running
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn Listener>>) {
        self.lifecycle.lock().listener = listener;
    }

    pub fn listener(&self) -> Option<Arc<dyn Listener>> {
        self.lifecycle.lock().listener.clone()
    }

    pub fn thread_priority(&self) -> ThreadPriority {
        self.lifecycle.lock().priority
    }

    pub fn set_thread_priority(&self, priority: ThreadPriority) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        check_stopped(lifecycle.state, "change thread priority")?;
        lifecycle.priority = priority;
        Ok(())
    }

    /// Fail with `IllegalState` unless STOPPED
    pub fn ensure_stopped(&self, operation: &'static str) -> Result<()> {
        check_stopped(self.state(), operation)
    }

    /// STOPPED → RUNNING, atomically
    pub fn begin_run(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != State::Stopped {
            return Err(BridgeError::IllegalState {
                operation: "run",
                state: lifecycle.state,
            });
        }
        lifecycle.state = State::Running;
        Ok(())
    }

    /// RUNNING → STOPPING; `interrupt` runs under the lifecycle lock
    ///
    /// Returns `false` (and skips `interrupt`) when the loop was not running.
    pub fn request_stop(&self, interrupt: impl FnOnce()) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != State::Running {
            return false;
        }
        info!(endpoint = self.name, "Stop requested");
        lifecycle.state = State::Stopping;
        interrupt();
        true
    }

    /// Terminal transition of a run, whatever ended it
    ///
    /// Moves to STOPPED, runs `cleanup` under the lifecycle lock, then
    /// reports `result` to the listener unless the loop ended because of
    /// a stop request.
    pub fn finish_run(&self, result: io::Result<()>, cleanup: impl FnOnce()) {
        let stop_requested = {
            let mut lifecycle = self.lifecycle.lock();
            let stop_requested = lifecycle.state == State::Stopping;
            lifecycle.state = State::Stopped;
            cleanup();
            stop_requested
        };
        info!(endpoint = self.name, "Stopped");

        match result {
            Ok(()) => {}
            Err(e) if stop_requested => {
                debug!(endpoint = self.name, error = %e, "I/O interrupted by stop request");
            }
            Err(e) => {
                warn!(endpoint = self.name, error = %e, "Run ending due to error");
                if let Some(listener) = self.listener() {
                    listener.on_run_error(e);
                }
            }
        }
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer.lock().len()
    }

    pub fn set_read_buffer_size(&self, size: usize) -> Result<()> {
        check_buffer_size("read_buffer_size", size)?;
        let lifecycle = self.lifecycle.lock();
        check_stopped(lifecycle.state, "resize read buffer")?;
        let mut buffer = self.read_buffer.lock();
        if buffer.len() != size {
            *buffer = vec![0; size];
        }
        Ok(())
    }

    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer.lock().capacity()
    }

    pub fn set_write_buffer_size(&self, size: usize) -> Result<()> {
        check_buffer_size("write_buffer_size", size)?;
        let lifecycle = self.lifecycle.lock();
        check_stopped(lifecycle.state, "resize write buffer")?;
        let mut buffer = self.write_buffer.lock();
        if buffer.capacity() != size {
            buffer.resize(size)?;
        }
        Ok(())
    }

    pub fn write_async(&self, data: &[u8]) -> Result<()> {
        self.write_buffer.lock().push(data)
    }

    pub fn pending_writes(&self) -> Bytes {
        self.write_buffer.lock().snapshot()
    }

    // =========================================================================
    // Loop
    // =========================================================================

    /// Step until the state leaves RUNNING or the link fails
    pub fn serve<L: Link>(&self, link: &mut L) -> io::Result<()> {
        let idle = Duration::from_millis(IDLE_POLL_INTERVAL_MS);
        loop {
            let state = self.state();
            if state != State::Running {
                info!(endpoint = self.name, %state, "Leaving run loop");
                return Ok(());
            }
            if !self.step(link)? {
                std::thread::sleep(idle);
            }
        }
    }

    /// One flush-then-read cycle; returns whether any bytes moved
    fn step<L: Link>(&self, link: &mut L) -> io::Result<bool> {
        // Outgoing: drain under the lock, write without it
        let outgoing = self.write_buffer.lock().take();
        let wrote = match outgoing {
            Some(data) => {
                debug!(endpoint = self.name, len = data.len(), "Writing data");
                link.send(&data)?;
                true
            }
            None => false,
        };

        // Incoming
        if !link.has_pending_input()? {
            return Ok(wrote);
        }
        let data = {
            let mut buffer = self.read_buffer.lock();
            let len = link.receive(&mut buffer)?;
            if len == 0 {
                return Ok(wrote);
            }
            Bytes::copy_from_slice(&buffer[..len])
        };
        debug!(endpoint = self.name, len = data.len(), "Read data");

        if let Some(listener) = self.listener() {
            listener.on_new_data(data);
        }
        Ok(true)
    }
}

fn check_stopped(state: State, operation: &'static str) -> Result<()> {
    if state == State::Stopped {
        Ok(())
    } else {
        Err(BridgeError::IllegalState { operation, state })
    }
}

fn check_buffer_size(field: &'static str, size: usize) -> Result<()> {
    if size == 0 {
        return Err(BridgeError::ConfigValidation {
            field,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory link: scripted input chunks, captured output
    #[derive(Default)]
    struct ScriptedLink {
        input: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        events: Vec<&'static str>,
    }

    impl Link for ScriptedLink {
        fn send(&mut self, data: &[u8]) -> io::Result<()> {
            self.events.push("send");
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn has_pending_input(&mut self) -> io::Result<bool> {
            self.events.push("poll");
            Ok(!self.input.is_empty())
        }

        fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.events.push("receive");
            let chunk = self.input.pop_front().unwrap_or_default();
            let len = chunk.len().min(buf.len());
            buf[..len].copy_from_slice(&chunk[..len]);
            Ok(len)
        }
    }

    #[derive(Default)]
    struct Collector {
        data: parking_lot::Mutex<Vec<Vec<u8>>>,
        errors: AtomicUsize,
    }

    impl Listener for Collector {
        fn on_new_data(&self, data: Bytes) {
            self.data.lock().push(data.to_vec());
        }

        fn on_run_error(&self, _error: io::Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_pump_is_stopped_with_defaults() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        assert_eq!(pump.state(), State::Stopped);
        assert_eq!(pump.read_buffer_size(), DEFAULT_BUFFER_SIZE);
        assert_eq!(pump.write_buffer_size(), DEFAULT_BUFFER_SIZE);
        assert!(pump.listener().is_none());
    }

    #[test]
    fn test_step_flushes_before_reading() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        let collector = Arc::new(Collector::default());
        pump.set_listener(Some(collector.clone()));
        pump.write_async(&[1, 2]).unwrap();
        pump.write_async(&[3]).unwrap();

        let mut link = ScriptedLink::default();
        link.input.push_back(vec![0xAA; 10]);

        assert!(pump.step(&mut link).unwrap());
        assert_eq!(link.events, vec!["send", "poll", "receive"]);
        assert_eq!(link.sent, vec![vec![1, 2, 3]]);
        assert_eq!(*collector.data.lock(), vec![vec![0xAA; 10]]);
    }

    #[test]
    fn test_idle_step_skips_write_and_read() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        let mut link = ScriptedLink::default();

        assert!(!pump.step(&mut link).unwrap());
        assert_eq!(link.events, vec!["poll"]);
    }

    #[test]
    fn test_read_is_bounded_by_read_buffer() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        pump.set_read_buffer_size(4).unwrap();
        let collector = Arc::new(Collector::default());
        pump.set_listener(Some(collector.clone()));

        let mut link = ScriptedLink::default();
        link.input.push_back(vec![7; 9]);
        pump.step(&mut link).unwrap();

        assert_eq!(*collector.data.lock(), vec![vec![7; 4]]);
    }

    #[test]
    fn test_begin_run_twice_is_illegal() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        pump.begin_run().unwrap();

        let err = pump.begin_run().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::IllegalState {
                operation: "run",
                state: State::Running
            }
        ));
    }

    #[test]
    fn test_configuration_rejected_while_running() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        pump.begin_run().unwrap();

        assert!(pump.set_read_buffer_size(16).is_err());
        assert!(pump.set_write_buffer_size(16).is_err());
        assert!(pump.set_thread_priority(ThreadPriority::High).is_err());
        assert_eq!(pump.read_buffer_size(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        assert!(matches!(
            pump.set_read_buffer_size(0),
            Err(BridgeError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_stop_only_from_running() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        let mut interrupted = false;
        assert!(!pump.request_stop(|| interrupted = true));
        assert!(!interrupted);

        pump.begin_run().unwrap();
        assert!(pump.request_stop(|| interrupted = true));
        assert!(interrupted);
        assert_eq!(pump.state(), State::Stopping);

        // Second request is a no-op
        assert!(!pump.request_stop(|| {}));
    }

    #[test]
    fn test_error_after_stop_is_not_reported() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        let collector = Arc::new(Collector::default());
        pump.set_listener(Some(collector.clone()));

        pump.begin_run().unwrap();
        pump.request_stop(|| {});
        pump.finish_run(Err(io::Error::other("socket closed")), || {});

        assert_eq!(pump.state(), State::Stopped);
        assert_eq!(collector.errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_error_while_running_is_reported_once() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        let collector = Arc::new(Collector::default());
        pump.set_listener(Some(collector.clone()));

        pump.begin_run().unwrap();
        let mut cleaned = false;
        pump.finish_run(Err(io::Error::other("broken pipe")), || cleaned = true);

        assert!(cleaned);
        assert_eq!(pump.state(), State::Stopped);
        assert_eq!(collector.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_serve_returns_when_not_running() {
        let pump = Pump::new("test", ThreadPriority::Normal);
        let mut link = ScriptedLink::default();
        pump.serve(&mut link).unwrap();
        assert!(link.events.is_empty());
    }
}
