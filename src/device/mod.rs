//! Batched packet I/O devices
//!
//! Provides the batch read/write contract the data plane is built on:
//! - TUN: kernel virtual interface (Linux)
//! - Memory: channel-backed device for tests and simulations

pub mod link;
mod memory;
mod tun;

pub use memory::{MemoryDevice, MemoryDeviceHandle};
pub use tun::TunDevice;

use crate::Result;
use std::future::Future;

/// Maximum number of packets handled per read and write
pub const BATCH_SIZE: usize = 128;

/// Leading bytes reserved in every packet buffer for a lower layer's header
pub const HEADER_OFFSET: usize = 10;

/// Nominal interface MTU
pub const DEFAULT_MTU: u16 = 1500;

/// Capacity of a single packet buffer, header reservation included
pub const MAX_PACKET_SIZE: usize = 65535 + HEADER_OFFSET;

/// Batched packet device
///
/// A device is read by at most one task and written by at most one task at a
/// time, but the reader and the writer may run concurrently, so both
/// operations take `&self`.
pub trait Device: Send + Sync + 'static {
    /// Interface name, used for logging and metrics labels
    fn name(&self) -> &str;

    /// Read up to `bufs.len()` packets.
    ///
    /// Each buffer is handed over at its full read length through `AsMut`.
    /// The payload of packet `i` is written to
    /// `bufs[i][offset..offset + sizes[i]]`; the bytes before `offset` are left
    /// for the device's own use. Blocks until at least one packet is available
    /// and returns the number of packets read.
    fn read_batch<B>(
        &self,
        bufs: &mut [B],
        sizes: &mut [usize],
        offset: usize,
    ) -> impl Future<Output = Result<usize>> + Send
    where
        B: AsMut<[u8]> + Send;

    /// Write a batch of packets.
    ///
    /// Every buffer already contains its `offset` reservation followed by the
    /// payload. Returns the number of packets accepted. Batches are not
    /// atomic: a failure part way through is reported as
    /// [`Error::PartialWrite`](crate::Error::PartialWrite) carrying the number
    /// of packets that did go out.
    fn write_batch<B>(&self, bufs: &[B], offset: usize) -> impl Future<Output = Result<usize>> + Send
    where
        B: AsRef<[u8]> + Sync;
}
