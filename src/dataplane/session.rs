//! Forwarding session: two devices, one strategy, both directions

use super::batch::BatchBuffers;
use super::direct::DirectForwarder;
use super::pool::BufferPool;
use super::queued::QueuedForwarder;
use crate::config::{ForwardingConfig, ForwardingMode};
use crate::device::{Device, HEADER_OFFSET, MAX_PACKET_SIZE};
use crate::telemetry::MetricsRegistry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Forwarding strategy, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Queued { pooled: bool },
}

impl From<&ForwardingConfig> for Strategy {
    fn from(config: &ForwardingConfig) -> Self {
        match config.mode {
            ForwardingMode::Direct => Strategy::Direct,
            ForwardingMode::Queued => Strategy::Queued {
                pooled: config.pooled,
            },
        }
    }
}

/// Pairing of two devices and a forwarding strategy
pub struct ForwardingSession<A, B> {
    a: Arc<A>,
    b: Arc<B>,
    config: ForwardingConfig,
    pool: Option<Arc<BufferPool>>,
    metrics: Arc<MetricsRegistry>,
}

impl<A: Device, B: Device> ForwardingSession<A, B> {
    /// The buffer pool, if any, is created here and shared by both directions.
    pub fn new(a: Arc<A>, b: Arc<B>, config: ForwardingConfig, metrics: Arc<MetricsRegistry>) -> Self {
        let pool = config
            .uses_pool()
            .then(|| Arc::new(BufferPool::new(MAX_PACKET_SIZE)));
        Self {
            a,
            b,
            config,
            pool,
            metrics,
        }
    }

    pub fn strategy(&self) -> Strategy {
        Strategy::from(&self.config)
    }

    pub fn pool(&self) -> Option<&Arc<BufferPool>> {
        self.pool.as_ref()
    }

    /// Spawn the forwarding tasks for both directions on the current runtime.
    pub fn start(self) -> SessionHandle {
        info!(
            a = self.a.name(),
            b = self.b.name(),
            strategy = ?self.strategy(),
            batch_size = self.config.batch_size,
            "starting forwarding session"
        );

        let mut tasks = Vec::new();
        tasks.extend(self.spawn_direction(self.a.clone(), self.b.clone()));
        tasks.extend(self.spawn_direction(self.b.clone(), self.a.clone()));

        SessionHandle {
            tasks,
            pool: self.pool,
            metrics: self.metrics,
        }
    }

    fn spawn_direction<S: Device, D: Device>(
        &self,
        src: Arc<S>,
        dst: Arc<D>,
    ) -> Vec<(String, JoinHandle<()>)> {
        let label = super::direction_label(&*src, &*dst);
        let stats = self.metrics.register_direction(&label);
        let batch = BatchBuffers::new(self.config.batch_size.max(1), MAX_PACKET_SIZE, HEADER_OFFSET);

        match self.config.mode {
            ForwardingMode::Direct => {
                let forwarder = DirectForwarder::new(src, dst, batch, stats);
                vec![(label, tokio::spawn(forwarder.run()))]
            }
            ForwardingMode::Queued => {
                let forwarder = QueuedForwarder::new(
                    src,
                    dst,
                    batch,
                    self.config.queue_capacity,
                    self.pool.clone(),
                    stats,
                );
                let (reader, writer) = forwarder.spawn();
                vec![
                    (format!("{} reader", label), reader),
                    (format!("{} writer", label), writer),
                ]
            }
        }
    }
}

/// Running session
///
/// Forwarding errors never surface here; a direction whose source failed
/// simply shows up as finished tasks.
pub struct SessionHandle {
    tasks: Vec<(String, JoinHandle<()>)>,
    pool: Option<Arc<BufferPool>>,
    metrics: Arc<MetricsRegistry>,
}

impl SessionHandle {
    /// Names of tasks still running
    pub fn active_tasks(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|(_, task)| task.is_finished())
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Refresh the pool gauges in the metrics registry.
    pub fn update_pool_gauges(&self) {
        if let Some(pool) = &self.pool {
            self.metrics
                .set_pool_gauges(pool.allocated(), pool.available());
        }
    }

    /// Wait for every task to finish on its own.
    pub async fn join(self) {
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(task = %name, error = %e, "forwarding task ended abnormally");
            }
        }
        if let Some(pool) = &self.pool {
            self.metrics.set_pool_gauges(pool.allocated(), pool.available());
        }
    }

    /// Abort all tasks. Packets still queued are dropped.
    pub fn shutdown(self) -> Arc<MetricsRegistry> {
        self.update_pool_gauges();
        for (name, task) in &self.tasks {
            if !task.is_finished() {
                info!(task = %name, "aborting forwarding task");
            }
            task.abort();
        }
        self.metrics
    }
}
