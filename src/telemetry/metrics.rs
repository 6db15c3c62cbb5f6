//! Metrics collection for packet statistics.
//!
//! Provides thread-safe counters for tracking forwarding metrics per
//! direction, plus buffer pool gauges.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-direction statistics.
#[derive(Debug, Default)]
pub struct DirectionStats {
    /// Packets read from the source device.
    pub rx_packets: Counter,
    /// Payload bytes read from the source device.
    pub rx_bytes: Counter,
    /// Successful `read_batch` calls.
    pub read_batches: Counter,
    /// Read failures (terminal for the direction).
    pub read_errors: Counter,
    /// Packets placed on the queue (queued strategy only).
    pub enqueued: Counter,
    /// Packets accepted by the destination device.
    pub tx_packets: Counter,
    /// Payload bytes accepted by the destination device.
    pub tx_bytes: Counter,
    /// `write_batch` calls issued.
    pub write_batches: Counter,
    /// Failed `write_batch` calls.
    pub write_errors: Counter,
    /// Packets lost to failed writes.
    pub tx_dropped: Counter,
    /// Pooled buffers too small for the packet, replaced by a fresh allocation.
    pub undersized_buffers: Counter,
}

impl DirectionStats {
    /// Creates new statistics initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one read batch of `packets` packets totalling `bytes` payload bytes.
    pub fn record_read(&self, packets: usize, bytes: usize) {
        self.read_batches.inc();
        self.rx_packets.add(packets as u64);
        self.rx_bytes.add(bytes as u64);
    }

    /// Records one write batch; `accepted` of `total` packets went out.
    pub fn record_write(&self, accepted: usize, total: usize, bytes: usize) {
        self.write_batches.inc();
        self.tx_packets.add(accepted as u64);
        self.tx_bytes.add(bytes as u64);
        self.tx_dropped.add(total.saturating_sub(accepted) as u64);
    }

    pub fn record_write_error(&self) {
        self.write_errors.inc();
    }

    pub fn record_read_error(&self) {
        self.read_errors.inc();
    }
}

/// Global metrics registry for a forwarding session.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Per-direction statistics, keyed by "src->dst".
    directions: RwLock<BTreeMap<String, Arc<DirectionStats>>>,

    /// Buffers ever allocated by the pool.
    pub pool_allocated: AtomicU64,
    /// Buffers sitting idle in the pool.
    pub pool_idle: AtomicU64,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a direction and returns its statistics.
    ///
    /// Registering the same label twice returns the existing statistics.
    pub fn register_direction(&self, label: &str) -> Arc<DirectionStats> {
        let mut directions = self.directions.write();
        directions.entry(label.to_string()).or_default().clone()
    }

    /// Gets the statistics for a direction.
    pub fn direction(&self, label: &str) -> Option<Arc<DirectionStats>> {
        self.directions.read().get(label).cloned()
    }

    /// Updates the buffer pool gauges.
    pub fn set_pool_gauges(&self, allocated: u64, idle: usize) {
        self.pool_allocated.store(allocated, Ordering::Relaxed);
        self.pool_idle.store(idle as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            (
                "pool_allocated".into(),
                self.pool_allocated.load(Ordering::Relaxed),
            ),
            ("pool_idle".into(), self.pool_idle.load(Ordering::Relaxed)),
        ];

        let directions = self.directions.read();
        for (label, stats) in directions.iter() {
            result.extend([
                (format!("{}_rx_packets", label), stats.rx_packets.get()),
                (format!("{}_rx_bytes", label), stats.rx_bytes.get()),
                (format!("{}_read_batches", label), stats.read_batches.get()),
                (format!("{}_read_errors", label), stats.read_errors.get()),
                (format!("{}_enqueued", label), stats.enqueued.get()),
                (format!("{}_tx_packets", label), stats.tx_packets.get()),
                (format!("{}_tx_bytes", label), stats.tx_bytes.get()),
                (format!("{}_write_batches", label), stats.write_batches.get()),
                (format!("{}_write_errors", label), stats.write_errors.get()),
                (format!("{}_tx_dropped", label), stats.tx_dropped.get()),
                (
                    format!("{}_undersized_buffers", label),
                    stats.undersized_buffers.get(),
                ),
            ]);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(10);
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn test_direction_stats() {
        let stats = DirectionStats::new();

        stats.record_read(3, 300);
        stats.record_read(1, 40);
        stats.record_write(2, 4, 200);

        assert_eq!(stats.read_batches.get(), 2);
        assert_eq!(stats.rx_packets.get(), 4);
        assert_eq!(stats.rx_bytes.get(), 340);
        assert_eq!(stats.write_batches.get(), 1);
        assert_eq!(stats.tx_packets.get(), 2);
        assert_eq!(stats.tx_dropped.get(), 2);
    }

    #[test]
    fn test_register_direction_is_idempotent() {
        let registry = MetricsRegistry::new();
        let first = registry.register_direction("tun11->tun22");
        first.rx_packets.inc();

        let again = registry.register_direction("tun11->tun22");
        assert_eq!(again.rx_packets.get(), 1);
        assert!(registry.direction("tun22->tun11").is_none());
    }

    #[test]
    fn test_metrics_registry_export() {
        let registry = MetricsRegistry::new();
        registry.register_direction("a->b").record_read(5, 500);
        registry.register_direction("b->a").record_write(1, 1, 64);
        registry.set_pool_gauges(12, 7);

        let metrics = registry.export();

        assert!(metrics.contains(&("pool_allocated".into(), 12)));
        assert!(metrics.contains(&("pool_idle".into(), 7)));
        assert!(metrics.contains(&("a->b_rx_packets".into(), 5)));
        assert!(metrics.contains(&("a->b_rx_bytes".into(), 500)));
        assert!(metrics.contains(&("b->a_tx_bytes".into(), 64)));
    }
}
