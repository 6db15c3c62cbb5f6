//! Direct forwarding: read a batch, write the same batch
//!
//! One task per direction. Read and write of a batch are strictly sequential,
//! so a slow destination holds back the next read.

use super::batch::BatchBuffers;
use crate::device::Device;
use crate::telemetry::DirectionStats;
use std::sync::Arc;
use tracing::{error, info, trace, warn};

pub struct DirectForwarder<S, D> {
    src: Arc<S>,
    dst: Arc<D>,
    batch: BatchBuffers,
    stats: Arc<DirectionStats>,
    label: String,
}

impl<S: Device, D: Device> DirectForwarder<S, D> {
    pub fn new(
        src: Arc<S>,
        dst: Arc<D>,
        batch: BatchBuffers,
        stats: Arc<DirectionStats>,
    ) -> Self {
        let label = super::direction_label(&*src, &*dst);
        Self {
            src,
            dst,
            batch,
            stats,
            label,
        }
    }

    /// Forward until the source fails.
    pub async fn run(mut self) {
        info!(direction = %self.label, "direct forwarder started");

        loop {
            let n = match self.batch.read_from(&*self.src).await {
                Ok(n) => n,
                Err(e) => {
                    self.stats.record_read_error();
                    error!(direction = %self.label, error = %e, "read failed, stopping direction");
                    break;
                }
            };

            let bytes = self.batch.payload_bytes(n);
            self.stats.record_read(n, bytes);

            let offset = self.batch.header_offset();
            match self.dst.write_batch(self.batch.filled(n), offset).await {
                Ok(written) => {
                    trace!(direction = %self.label, packets = written, "batch forwarded");
                    self.stats.record_write(written, n, bytes);
                }
                Err(e) => {
                    let written = e.written().min(n);
                    let sent = self.batch.payload_bytes(written);
                    self.stats.record_write(written, n, sent);
                    self.stats.record_write_error();
                    warn!(direction = %self.label, error = %e, "write failed");
                }
            }
        }

        info!(direction = %self.label, "direct forwarder stopped");
    }
}
