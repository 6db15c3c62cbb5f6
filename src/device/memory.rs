//! In-memory device
//!
//! Packets injected through a [`MemoryDeviceHandle`] come out of
//! `read_batch`; everything passed to `write_batch` is recorded so callers can
//! inspect what a forwarder produced. Writes can be paused or made to fail.

use super::Device;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc, watch};

#[derive(Debug, Default)]
struct Recorded {
    /// Payloads of accepted packets, in write order
    packets: Vec<Vec<u8>>,
    /// Length of every batch handed to `write_batch`
    batches: Vec<usize>,
}

#[derive(Debug)]
struct Shared {
    recorded: Mutex<Recorded>,
    write_gate: watch::Sender<bool>,
    failing_writes: AtomicUsize,
    written: Notify,
}

/// Channel-backed [`Device`]
#[derive(Debug)]
pub struct MemoryDevice {
    name: String,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    shared: Arc<Shared>,
}

/// Test-side control of a [`MemoryDevice`]
#[derive(Debug, Clone)]
pub struct MemoryDeviceHandle {
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    shared: Arc<Shared>,
}

impl MemoryDevice {
    pub fn new(name: impl Into<String>) -> (Self, MemoryDeviceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (write_gate, _) = watch::channel(true);
        let shared = Arc::new(Shared {
            recorded: Mutex::new(Recorded::default()),
            write_gate,
            failing_writes: AtomicUsize::new(0),
            written: Notify::new(),
        });

        let device = Self {
            name: name.into(),
            inbound: tokio::sync::Mutex::new(rx),
            shared: shared.clone(),
        };
        let handle = MemoryDeviceHandle {
            inbound: Some(tx),
            shared,
        };
        (device, handle)
    }
}

impl MemoryDeviceHandle {
    /// Queue a packet payload for the next `read_batch`.
    ///
    /// Returns false once the input has been closed.
    pub fn inject(&self, payload: impl Into<Vec<u8>>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(payload.into()).is_ok(),
            None => false,
        }
    }

    /// Close the input side: once drained, reads fail with `DeviceClosed`.
    ///
    /// Clones of this handle keep their own sender alive.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Block writers until [`resume_writes`](Self::resume_writes) is called.
    pub fn pause_writes(&self) {
        self.shared.write_gate.send_replace(false);
    }

    pub fn resume_writes(&self) {
        self.shared.write_gate.send_replace(true);
    }

    /// Make the next `count` write calls fail without accepting anything.
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Payloads accepted so far, in write order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.recorded.lock().packets.clone()
    }

    pub fn written_count(&self) -> usize {
        self.shared.recorded.lock().packets.len()
    }

    /// Sizes of all batches handed to `write_batch`, failed ones included.
    pub fn write_batches(&self) -> Vec<usize> {
        self.shared.recorded.lock().batches.clone()
    }

    /// Wait until at least `count` packets have been accepted.
    pub async fn wait_for_written(&self, count: usize) {
        loop {
            let notified = self.shared.written.notified();
            if self.written_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Device for MemoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_batch<B>(
        &self,
        bufs: &mut [B],
        sizes: &mut [usize],
        offset: usize,
    ) -> Result<usize>
    where
        B: AsMut<[u8]> + Send,
    {
        let max = bufs.len().min(sizes.len());
        if max == 0 {
            return Ok(0);
        }

        let mut inbound = self.inbound.lock().await;
        let Some(first) = inbound.recv().await else {
            return Err(Error::DeviceClosed {
                name: self.name.clone(),
            });
        };

        let mut next = Some(first);
        let mut count = 0;
        while let Some(payload) = next {
            // Oversized payloads are truncated, as a short read from a real interface would be
            let room = &mut bufs[count].as_mut()[offset..];
            let len = payload.len().min(room.len());
            room[..len].copy_from_slice(&payload[..len]);
            sizes[count] = len;
            count += 1;

            next = if count < max {
                inbound.try_recv().ok()
            } else {
                None
            };
        }

        Ok(count)
    }

    async fn write_batch<B>(&self, bufs: &[B], offset: usize) -> Result<usize>
    where
        B: AsRef<[u8]> + Sync,
    {
        let mut gate = self.shared.write_gate.subscribe();
        // The sender lives in `shared`, so the gate cannot close underneath us
        let _ = gate.wait_for(|open| *open).await;

        self.shared.recorded.lock().batches.push(bufs.len());

        let failing = self
            .shared
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::PartialWrite {
                written: 0,
                total: bufs.len(),
                source: io::Error::other("injected write failure"),
            });
        }

        {
            let mut recorded = self.shared.recorded.lock();
            recorded
                .packets
                .extend(bufs.iter().map(|buf| buf.as_ref()[offset..].to_vec()));
        }
        self.shared.written.notify_waiters();

        Ok(bufs.len())
    }
}
