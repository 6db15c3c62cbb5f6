//! Read-side batch buffers

use crate::Result;
use crate::device::Device;
use tracing::trace;

/// One read buffer of the batch
///
/// Devices fill it through `AsMut` at its full length; `AsRef` views the
/// frame left by the last read (header reservation plus payload), which is
/// what gets handed to `write_batch`.
#[derive(Debug, Clone)]
pub struct BatchSlot {
    data: Vec<u8>,
    filled: usize,
}

impl BatchSlot {
    fn new(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
            filled: 0,
        }
    }
}

impl AsRef<[u8]> for BatchSlot {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.filled]
    }
}

impl AsMut<[u8]> for BatchSlot {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Fixed set of read buffers reused for every `read_batch` call
pub struct BatchBuffers {
    slots: Vec<BatchSlot>,
    sizes: Vec<usize>,
    header_offset: usize,
}

impl BatchBuffers {
    /// `buf_len` includes the `header_offset` reservation.
    pub fn new(batch_size: usize, buf_len: usize, header_offset: usize) -> Self {
        debug_assert!(buf_len > header_offset);
        Self {
            slots: vec![BatchSlot::new(buf_len); batch_size],
            sizes: vec![0; batch_size],
            header_offset,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.slots.len()
    }

    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    /// Read the next non-empty batch from `device`.
    ///
    /// Every buffer is presented at full length. Empty reads are retried.
    pub async fn read_from<D: Device>(&mut self, device: &D) -> Result<usize> {
        loop {
            let n = device
                .read_batch(&mut self.slots, &mut self.sizes, self.header_offset)
                .await?
                .min(self.slots.len());
            if n > 0 {
                for (slot, size) in self.slots.iter_mut().zip(&self.sizes).take(n) {
                    slot.filled = self.header_offset + size;
                }
                return Ok(n);
            }
            trace!(interface = device.name(), "empty read, retrying");
        }
    }

    /// The first `n` slots of the last batch, ready for `write_batch`.
    pub fn filled(&self, n: usize) -> &[BatchSlot] {
        &self.slots[..n]
    }

    /// Frame `i` of the last batch: header reservation plus payload.
    pub fn frame(&self, i: usize) -> &[u8] {
        self.slots[i].as_ref()
    }

    /// Total payload bytes of the first `n` packets.
    pub fn payload_bytes(&self, n: usize) -> usize {
        self.sizes[..n].iter().sum()
    }
}
