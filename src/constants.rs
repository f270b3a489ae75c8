//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Network
// =============================================================================

/// Default TCP port the telemetry client connects to
pub const DEFAULT_TCP_PORT: u16 = 8888;

/// Receive buffer size of the passive listening socket
pub const LISTEN_RECV_BUFFER_SIZE: usize = 4096;

/// Interval between non-blocking accept attempts while waiting for a client (milliseconds)
pub const ACCEPT_POLL_INTERVAL_MS: u64 = 10;

// =============================================================================
// Serial
// =============================================================================

/// Default baud rate of the autopilot USB link
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Default serial read/write timeout (milliseconds)
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 1000;

/// Consecutive zero-byte reads before assuming port disconnected
pub const SERIAL_DISCONNECT_THRESHOLD: u32 = 10;

// =============================================================================
// Buffers
// =============================================================================

/// Default read/write buffer size for a freshly constructed endpoint
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Buffer size used by the orchestrator for both endpoints
pub const BRIDGE_BUFFER_SIZE: usize = 2048;

/// Channel capacity for bridge events
pub const CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Timing
// =============================================================================

/// Sleep after a step that neither wrote nor read (milliseconds)
pub const IDLE_POLL_INTERVAL_MS: u64 = 1;

/// Interval between throughput log lines in headless mode (seconds)
pub const STATS_LOG_INTERVAL_SECS: u64 = 5;

/// Minimum interval between rate updates (seconds)
pub const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.1;

// =============================================================================
// Retry
// =============================================================================

/// Maximum socket bind retry attempts
pub const MAX_SOCKET_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between retry attempts (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 200;
