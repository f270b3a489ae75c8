//! Traffic statistics for the bridge
//!
//! Thread-safe counters for measuring bytes/sec throughput.
//! Uses lock-free atomics for all operations.

use crate::constants::RATE_UPDATE_MIN_INTERVAL_SECS;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Traffic statistics with rate calculation (fully lock-free)
pub struct Stats {
    /// Bytes relayed from the serial device to the TCP client
    from_serial_total: AtomicU64,
    /// Bytes relayed from the TCP client to the serial device
    from_tcp_total: AtomicU64,
    /// Bytes refused by a full or closed peer
    dropped_total: AtomicU64,
    /// Snapshot of from_serial_total at last rate calculation
    from_serial_snapshot: AtomicU64,
    /// Snapshot of from_tcp_total at last rate calculation
    from_tcp_snapshot: AtomicU64,
    /// Reference instant for time calculations
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached serial->tcp rate in KB/s (stored as f64 bits)
    from_serial_rate: AtomicU64,
    /// Cached tcp->serial rate in KB/s (stored as f64 bits)
    from_tcp_rate: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            from_serial_total: AtomicU64::new(0),
            from_tcp_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            from_serial_snapshot: AtomicU64::new(0),
            from_tcp_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            from_serial_rate: AtomicU64::new(0),
            from_tcp_rate: AtomicU64::new(0),
        }
    }

    /// Add bytes relayed serial -> TCP
    #[inline]
    pub fn add_from_serial(&self, bytes: usize) {
        self.from_serial_total
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Add bytes relayed TCP -> serial
    #[inline]
    pub fn add_from_tcp(&self, bytes: usize) {
        self.from_tcp_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dropped(&self, bytes: usize) {
        self.dropped_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn from_serial_bytes(&self) -> u64 {
        self.from_serial_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn from_tcp_bytes(&self) -> u64 {
        self.from_tcp_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    fn cached_rates(&self) -> (f64, f64) {
        (
            f64::from_bits(self.from_serial_rate.load(Ordering::Relaxed)),
            f64::from_bits(self.from_tcp_rate.load(Ordering::Relaxed)),
        )
    }

    /// Update rate calculations and return (from_serial_kb_s, from_tcp_kb_s)
    /// Call this periodically (e.g., from the stats ticker)
    pub fn update_rates(&self) -> (f64, f64) {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS {
            // Too soon, return cached values
            return self.cached_rates();
        }

        // Try to claim the update (avoid duplicate calculations)
        if self
            .last_calc_nanos
            .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return self.cached_rates();
        }

        let serial_now = self.from_serial_total.load(Ordering::Relaxed);
        let tcp_now = self.from_tcp_total.load(Ordering::Relaxed);
        let serial_prev = self.from_serial_snapshot.swap(serial_now, Ordering::Relaxed);
        let tcp_prev = self.from_tcp_snapshot.swap(tcp_now, Ordering::Relaxed);

        let serial_rate = serial_now.saturating_sub(serial_prev) as f64 / elapsed / 1024.0; // KB/s
        let tcp_rate = tcp_now.saturating_sub(tcp_prev) as f64 / elapsed / 1024.0; // KB/s

        self.from_serial_rate
            .store(serial_rate.to_bits(), Ordering::Relaxed);
        self.from_tcp_rate.store(tcp_rate.to_bits(), Ordering::Relaxed);

        (serial_rate, tcp_rate)
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_counters_accumulate() {
        let stats = Stats::new();
        stats.add_from_serial(10);
        stats.add_from_serial(5);
        stats.add_from_tcp(3);
        stats.add_dropped(7);

        assert_eq!(stats.from_serial_bytes(), 15);
        assert_eq!(stats.from_tcp_bytes(), 3);
        assert_eq!(stats.dropped_bytes(), 7);
    }

    #[test]
    fn test_counters_are_shared_across_threads() {
        let stats = Arc::new(Stats::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add_from_tcp(1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(stats.from_tcp_bytes(), 4000);
    }

    #[test]
    fn test_update_rates_reports_traffic() {
        let stats = Stats::new();
        thread::sleep(Duration::from_millis(150));
        stats.add_from_serial(2048);

        let (serial_rate, tcp_rate) = stats.update_rates();
        assert!(serial_rate > 0.0);
        assert_eq!(tcp_rate, 0.0);
    }

    #[test]
    fn test_update_rates_too_soon_returns_cached() {
        let stats = Stats::new();
        thread::sleep(Duration::from_millis(150));
        stats.add_from_serial(1024);
        let first = stats.update_rates();

        // Immediately after: counters changed but the window has not elapsed
        stats.add_from_serial(1024 * 1024);
        let second = stats.update_rates();
        assert_eq!(first, second);
    }
}
