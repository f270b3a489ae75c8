//! Serial endpoint for the USB autopilot link
//!
//! Same lifecycle and step algorithm as the TCP endpoint, over an opened
//! serial device:
//! - availability check: `bytes_to_read()`
//! - reads bounded by the read timeout, writes by the write timeout
//!
//! The endpoint stops when:
//! - `stop()` is called (observed within one step)
//! - the device reports an I/O error
//! - the device keeps returning zero-byte reads (port gone)

use super::pump::{Link, Pump};
use super::{Endpoint, Listener, State, ThreadPriority};
use crate::config::SerialConfig;
use crate::constants::{DEFAULT_SERIAL_TIMEOUT_MS, SERIAL_DISCONNECT_THRESHOLD};
use crate::error::{BridgeError, Result};
use crate::platform;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Device handle driven by a `SerialEndpoint`
///
/// Implemented for `Box<dyn serialport::SerialPort>`; tests substitute a
/// scripted device.
pub trait SerialIo: Read + Write + Send {
    /// Timeout for the next blocking read or write
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Bytes waiting in the input queue, without blocking
    fn available(&self) -> io::Result<u32>;
}

impl SerialIo for Box<dyn SerialPort> {
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }

    fn available(&self) -> io::Result<u32> {
        self.bytes_to_read().map_err(io::Error::from)
    }
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    read: Duration,
    write: Duration,
}

/// Serial endpoint over any `SerialIo` device
///
/// # Example
///
/// ```ignore
/// let port = serial::open("/dev/ttyACM0", 57_600, Duration::from_secs(1))?;
/// let serial = SerialEndpoint::new("/dev/ttyACM0", port);
/// serial.set_read_timeout(Duration::from_secs(1))?;
/// serial.set_read_buffer_size(2048)?;
/// ```
pub struct SerialEndpoint<P: SerialIo = Box<dyn SerialPort>> {
    port_name: String,
    pump: Pump,
    device: Mutex<P>,
    timeouts: Mutex<Timeouts>,
}

impl<P: SerialIo> SerialEndpoint<P> {
    /// Wrap an already opened device
    pub fn new(port_name: impl Into<String>, device: P) -> Self {
        let timeout = Duration::from_millis(DEFAULT_SERIAL_TIMEOUT_MS);
        Self {
            port_name: port_name.into(),
            pump: Pump::new("serial", ThreadPriority::High),
            device: Mutex::new(device),
            timeouts: Mutex::new(Timeouts {
                read: timeout,
                write: timeout,
            }),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Upper bound of a single blocking read (only while STOPPED)
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        check_timeout("read_timeout", timeout)?;
        self.pump.ensure_stopped("change read timeout")?;
        self.timeouts.lock().read = timeout;
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        self.timeouts.lock().read
    }

    /// Upper bound of a single blocking write (only while STOPPED)
    pub fn set_write_timeout(&self, timeout: Duration) -> Result<()> {
        check_timeout("write_timeout", timeout)?;
        self.pump.ensure_stopped("change write timeout")?;
        self.timeouts.lock().write = timeout;
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        self.timeouts.lock().write
    }

    pub fn read_buffer_size(&self) -> usize {
        self.pump.read_buffer_size()
    }

    pub fn write_buffer_size(&self) -> usize {
        self.pump.write_buffer_size()
    }

    fn serve(&self) -> io::Result<()> {
        let mut device = self.device.lock();

        let priority = self.pump.thread_priority();
        if let Err(e) = platform::set_thread_priority(priority) {
            debug!(endpoint = self.pump.name(), ?priority, error = %e, "Thread priority not applied");
        }

        info!(endpoint = self.pump.name(), port = %self.port_name, "Running ...");
        let mut link = SerialLink::new(&mut *device, *self.timeouts.lock());
        self.pump.serve(&mut link)
    }
}

impl<P: SerialIo + 'static> Endpoint for SerialEndpoint<P> {
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
        // Cooperative: the device cannot be closed under a blocked read,
        // the loop notices within one read timeout
        self.pump.request_stop(|| {});
    }

    fn run(&self) -> Result<()> {
        self.pump.begin_run()?;
        let result = self.serve();
        self.pump.finish_run(result, || {});
        Ok(())
    }
}

/// Opened device as seen by the pump
struct SerialLink<'a, P: SerialIo> {
    device: &'a mut P,
    timeouts: Timeouts,
    current_timeout: Option<Duration>,
    zero_reads: u32,
}

impl<'a, P: SerialIo> SerialLink<'a, P> {
    fn new(device: &'a mut P, timeouts: Timeouts) -> Self {
        Self {
            device,
            timeouts,
            current_timeout: None,
            zero_reads: 0,
        }
    }

    /// Switch the device timeout only when it actually changes
    fn use_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        if self.current_timeout != Some(timeout) {
            self.device.set_io_timeout(timeout)?;
            self.current_timeout = Some(timeout);
        }
        Ok(())
    }
}

impl<P: SerialIo> Link for SerialLink<'_, P> {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.use_timeout(self.timeouts.write)?;
        self.device.write_all(data)?;
        self.device.flush()
    }

    fn has_pending_input(&mut self) -> io::Result<bool> {
        Ok(self.device.available()? > 0)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.use_timeout(self.timeouts.read)?;
        match self.device.read(buf) {
            Ok(0) => {
                // Zero bytes read - could be normal or port gone
                self.zero_reads += 1;
                if self.zero_reads > SERIAL_DISCONNECT_THRESHOLD {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "serial device stopped responding",
                    ));
                }
                Ok(0)
            }
            Ok(n) => {
                self.zero_reads = 0;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                // Normal timeout, reset error counter
                self.zero_reads = 0;
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn check_timeout(field: &'static str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(BridgeError::ConfigValidation {
            field,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

// =============================================================================
// Device discovery
// =============================================================================

/// Find the USB serial device to bridge
///
/// Picks the first USB port matching the configured VID/PID filter (any USB
/// port when no VID is configured).
///
/// # Errors
///
/// - `SerialEnumerate` - The OS port list is unavailable
/// - `NoDeviceFound` - No matching device found
pub fn detect(config: &SerialConfig) -> Result<String> {
    let ports = serialport::available_ports().map_err(|e| BridgeError::SerialEnumerate {
        source: io::Error::from(e),
    })?;

    let matching: Vec<_> = ports.iter().filter(|p| matches_device(p, config)).collect();
    if matching.len() > 1 {
        info!(
            count = matching.len(),
            "Several USB serial devices found, using the first"
        );
    }

    matching
        .first()
        .map(|p| p.port_name.clone())
        .ok_or(BridgeError::NoDeviceFound)
}

/// Check if a serial port matches the configured USB filter
fn matches_device(port: &SerialPortInfo, config: &SerialConfig) -> bool {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => match config.vid {
            Some(vid) => {
                usb.vid == vid && (config.pid_list.is_empty() || config.pid_list.contains(&usb.pid))
            }
            None => true,
        },
        _ => false,
    }
}

/// Open a serial port as 8 data bits, no parity, 1 stop bit, no flow control
pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    serialport::new(port_name, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| BridgeError::SerialOpen {
            port: port_name.to_string(),
            source: io::Error::from(e),
        })
}
