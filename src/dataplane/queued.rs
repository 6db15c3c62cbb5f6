//! Queued forwarding: reader and writer decoupled by a bounded queue
//!
//! Reader: `Reading -> Enqueuing -> Reading`, stopping on a read error.
//! Writer: `WaitingForPacket -> DrainingBatch -> Writing -> WaitingForPacket`.
//!
//! The writer never waits for more packets once it holds one: it takes
//! whatever is already queued (up to a full batch) and writes it.

use super::batch::BatchBuffers;
use super::packet::Packet;
use super::pool::BufferPool;
use crate::device::{Device, MAX_PACKET_SIZE};
use crate::telemetry::DirectionStats;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Copies packets off the source device into owned buffers and queues them
pub struct QueuedReader<S> {
    src: Arc<S>,
    batch: BatchBuffers,
    pool: Option<Arc<BufferPool>>,
    stats: Arc<DirectionStats>,
    label: String,
}

impl<S: Device> QueuedReader<S> {
    pub fn new(
        src: Arc<S>,
        batch: BatchBuffers,
        pool: Option<Arc<BufferPool>>,
        stats: Arc<DirectionStats>,
        label: String,
    ) -> Self {
        Self {
            src,
            batch,
            pool,
            stats,
            label,
        }
    }

    /// Read until the source fails. Blocks on `queue` when it is full.
    pub async fn run(mut self, queue: mpsc::Sender<Packet>) {
        info!(direction = %self.label, pooled = self.pool.is_some(), "queue reader started");

        loop {
            let n = match self.batch.read_from(&*self.src).await {
                Ok(n) => n,
                Err(e) => {
                    self.stats.record_read_error();
                    error!(direction = %self.label, error = %e, "read failed, stopping reader");
                    break;
                }
            };
            self.stats.record_read(n, self.batch.payload_bytes(n));

            for i in 0..n {
                let packet = self.fill(self.batch.frame(i));
                if queue.send(packet).await.is_err() {
                    info!(direction = %self.label, "queue closed, stopping reader");
                    return;
                }
                self.stats.enqueued.inc();
            }
        }

        info!(direction = %self.label, "queue reader stopped");
    }

    fn fill(&self, frame: &[u8]) -> Packet {
        let offset = self.batch.header_offset();

        let Some(pool) = &self.pool else {
            let buffer = Vec::with_capacity(MAX_PACKET_SIZE.max(frame.len()));
            return Packet::copy_from(buffer, frame, offset, false);
        };

        let buffer = pool.acquire();
        if buffer.capacity() < frame.len() {
            // The checkout is dropped here and never returned; the pool shrinks by one
            self.stats.undersized_buffers.inc();
            debug!(
                direction = %self.label,
                capacity = buffer.capacity(),
                needed = frame.len(),
                "pooled buffer too small, allocating replacement"
            );
            return Packet::copy_from(Vec::with_capacity(frame.len()), frame, offset, false);
        }
        Packet::copy_from(buffer, frame, offset, true)
    }
}

/// Drains the queue into batched writes on the destination device
pub struct QueuedWriter<D> {
    dst: Arc<D>,
    batch_size: usize,
    header_offset: usize,
    pool: Option<Arc<BufferPool>>,
    stats: Arc<DirectionStats>,
    label: String,
}

impl<D: Device> QueuedWriter<D> {
    pub fn new(
        dst: Arc<D>,
        batch_size: usize,
        header_offset: usize,
        pool: Option<Arc<BufferPool>>,
        stats: Arc<DirectionStats>,
        label: String,
    ) -> Self {
        Self {
            dst,
            batch_size: batch_size.max(1),
            header_offset,
            pool,
            stats,
            label,
        }
    }

    /// Write until every sender of `queue` is gone and the queue is empty.
    pub async fn run(self, mut queue: mpsc::Receiver<Packet>) {
        info!(direction = %self.label, "queue writer started");
        let mut batch: Vec<Packet> = Vec::with_capacity(self.batch_size);

        while let Some(first) = queue.recv().await {
            batch.push(first);
            while batch.len() < self.batch_size {
                match queue.try_recv() {
                    Ok(packet) => batch.push(packet),
                    Err(_) => break,
                }
            }

            self.write(&batch).await;
            self.recycle(&mut batch);
        }

        info!(direction = %self.label, "queue closed, writer stopped");
    }

    async fn write(&self, batch: &[Packet]) {
        let total = batch.len();
        match self.dst.write_batch(batch, self.header_offset).await {
            Ok(written) => {
                let bytes: usize = batch.iter().take(written).map(Packet::len).sum();
                trace!(direction = %self.label, packets = written, "batch written");
                self.stats.record_write(written, total, bytes);
            }
            Err(e) => {
                let written = e.written();
                let bytes: usize = batch.iter().take(written).map(Packet::len).sum();
                self.stats.record_write(written, total, bytes);
                self.stats.record_write_error();
                warn!(direction = %self.label, error = %e, "write failed");
            }
        }
    }

    /// Empty the batch, handing pooled buffers back whether or not they were written.
    fn recycle(&self, batch: &mut Vec<Packet>) {
        match &self.pool {
            Some(pool) => {
                for packet in batch.drain(..) {
                    if packet.is_pooled() {
                        pool.release(packet.into_buffer());
                    }
                }
            }
            None => batch.clear(),
        }
    }
}

/// Reader and writer of one direction
pub struct QueuedForwarder<S, D> {
    reader: QueuedReader<S>,
    writer: QueuedWriter<D>,
    queue_capacity: usize,
}

impl<S: Device, D: Device> QueuedForwarder<S, D> {
    pub fn new(
        src: Arc<S>,
        dst: Arc<D>,
        batch: BatchBuffers,
        queue_capacity: usize,
        pool: Option<Arc<BufferPool>>,
        stats: Arc<DirectionStats>,
    ) -> Self {
        let label = super::direction_label(&*src, &*dst);
        let writer = QueuedWriter::new(
            dst,
            batch.batch_size(),
            batch.header_offset(),
            pool.clone(),
            stats.clone(),
            label.clone(),
        );
        let reader = QueuedReader::new(src, batch, pool, stats, label);
        Self {
            reader,
            writer,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Spawn the reader and writer tasks, returned in that order.
    pub fn spawn(self) -> (JoinHandle<()>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let reader = tokio::spawn(self.reader.run(tx));
        let writer = tokio::spawn(self.writer.run(rx));
        (reader, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HEADER_OFFSET, MemoryDevice, MemoryDeviceHandle};
    use std::time::Duration;

    fn packet(payload: &[u8], pool: Option<&BufferPool>) -> Packet {
        let mut frame = vec![0u8; HEADER_OFFSET];
        frame.extend_from_slice(payload);
        match pool {
            Some(pool) => Packet::copy_from(pool.acquire(), &frame, HEADER_OFFSET, true),
            None => Packet::copy_from(Vec::new(), &frame, HEADER_OFFSET, false),
        }
    }

    fn writer(
        batch_size: usize,
        pool: Option<Arc<BufferPool>>,
    ) -> (QueuedWriter<MemoryDevice>, MemoryDeviceHandle, Arc<DirectionStats>) {
        let (dst, handle) = MemoryDevice::new("dst");
        let stats = Arc::new(DirectionStats::new());
        let writer = QueuedWriter::new(
            Arc::new(dst),
            batch_size,
            HEADER_OFFSET,
            pool,
            stats.clone(),
            "test".to_string(),
        );
        (writer, handle, stats)
    }

    fn reader(
        pool: Option<Arc<BufferPool>>,
    ) -> (QueuedReader<MemoryDevice>, MemoryDeviceHandle, Arc<DirectionStats>) {
        let (src, handle) = MemoryDevice::new("src");
        let stats = Arc::new(DirectionStats::new());
        let reader = QueuedReader::new(
            Arc::new(src),
            BatchBuffers::new(8, 2048, HEADER_OFFSET),
            pool,
            stats.clone(),
            "test".to_string(),
        );
        (reader, handle, stats)
    }

    /// Poll `done` until it holds, failing after five seconds.
    async fn wait_until(done: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_writer_drains_queued_packets_into_batches() {
        let (writer, handle, stats) = writer(4, None);
        let (tx, rx) = mpsc::channel(16);
        for i in 0..10u8 {
            tx.send(packet(&[i; 3], None)).await.unwrap();
        }
        drop(tx);

        writer.run(rx).await;

        assert_eq!(handle.write_batches(), vec![4, 4, 2]);
        let payloads: Vec<u8> = handle.written().iter().map(|p| p[0]).collect();
        assert_eq!(payloads, (0..10).collect::<Vec<u8>>());
        assert_eq!(stats.tx_packets.get(), 10);
        assert_eq!(stats.tx_bytes.get(), 30);
    }

    #[tokio::test]
    async fn test_writer_does_not_wait_for_a_full_batch() {
        let (writer, handle, _stats) = writer(128, None);
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(writer.run(rx));

        tx.send(packet(b"first", None)).await.unwrap();
        handle.wait_for_written(1).await;
        tx.send(packet(b"second", None)).await.unwrap();
        handle.wait_for_written(2).await;

        assert_eq!(handle.write_batches(), vec![1, 1]);
        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_recycles_buffers_even_when_write_fails() {
        let pool = Arc::new(BufferPool::new(256));
        let (writer, handle, stats) = writer(8, Some(pool.clone()));
        handle.fail_next_writes(1);

        let (tx, rx) = mpsc::channel(16);
        for i in 0..3u8 {
            tx.send(packet(&[i], Some(&pool))).await.unwrap();
        }
        // Not from the pool: must not be returned to it
        tx.send(packet(&[9], None)).await.unwrap();
        drop(tx);

        writer.run(rx).await;

        assert!(handle.written().is_empty());
        assert_eq!(stats.write_errors.get(), 1);
        assert_eq!(stats.tx_dropped.get(), 4);
        assert_eq!(pool.allocated(), 3);
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test]
    async fn test_reader_blocks_when_queue_is_full() {
        let (reader, handle, stats) = reader(None);
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(reader.run(tx));

        for i in 0..5u8 {
            handle.inject(vec![i; 20]);
        }
        wait_until(|| stats.rx_packets.get() == 5 && stats.enqueued.get() == 4).await;

        // The fifth packet stays with the reader while the queue is full
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stats.enqueued.get(), 4);
        assert!(!task.is_finished());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload(), &[0u8; 20]);
        wait_until(|| stats.enqueued.get() == 5).await;

        let rest: Vec<u8> = {
            let mut v = Vec::new();
            for _ in 0..4 {
                v.push(rx.recv().await.unwrap().payload()[0]);
            }
            v
        };
        assert_eq!(rest, vec![1, 2, 3, 4]);
        task.abort();
    }

    #[tokio::test]
    async fn test_reader_copies_header_reservation() {
        let pool = Arc::new(BufferPool::new(MAX_PACKET_SIZE));
        let (reader, handle, _stats) = reader(Some(pool.clone()));
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(reader.run(tx));

        handle.inject(vec![0xab; 40]);
        let packet = rx.recv().await.unwrap();

        assert!(packet.is_pooled());
        assert_eq!(packet.header_offset(), HEADER_OFFSET);
        assert_eq!(packet.as_ref().len(), HEADER_OFFSET + 40);
        assert_eq!(packet.payload(), &[0xab; 40]);
        assert_eq!(pool.allocated(), 1);
        task.abort();
    }

    #[tokio::test]
    async fn test_reader_replaces_undersized_pool_buffer() {
        let pool = Arc::new(BufferPool::new(16));
        let (reader, handle, stats) = reader(Some(pool.clone()));
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(reader.run(tx));

        handle.inject(vec![7u8; 100]);
        let packet = rx.recv().await.unwrap();

        assert!(!packet.is_pooled());
        assert_eq!(packet.payload(), &[7u8; 100]);
        assert_eq!(stats.undersized_buffers.get(), 1);
        // The undersized checkout was discarded
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.available(), 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_reader_stops_on_read_error() {
        let (reader, mut handle, stats) = reader(None);
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(reader.run(tx));

        handle.inject(vec![1, 2, 3]);
        handle.close();
        task.await.unwrap();

        assert_eq!(stats.read_errors.get(), 1);
        assert_eq!(rx.recv().await.unwrap().payload(), &[1, 2, 3]);
        assert!(rx.recv().await.is_none());
    }
}
