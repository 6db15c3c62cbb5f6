//! Packets in transit between a queued reader and writer

/// An owned packet buffer
///
/// The buffer holds `header_offset` reserved bytes followed by `length` payload
/// bytes. Only the writer that dequeues a packet may hand its buffer back to
/// the pool, and only when the buffer came from the pool in the first place.
#[derive(Debug)]
pub struct Packet {
    buffer: Vec<u8>,
    length: usize,
    header_offset: usize,
    pooled: bool,
}

impl Packet {
    /// Fill `buffer` with `frame` (header reservation followed by payload).
    ///
    /// `pooled` marks buffers checked out of a [`BufferPool`](super::BufferPool).
    pub fn copy_from(mut buffer: Vec<u8>, frame: &[u8], header_offset: usize, pooled: bool) -> Self {
        debug_assert!(frame.len() >= header_offset);
        buffer.clear();
        buffer.extend_from_slice(frame);
        Self {
            buffer,
            length: frame.len() - header_offset,
            header_offset,
            pooled,
        }
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_offset..]
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Whether the buffer must go back to the pool once written
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

impl AsRef<[u8]> for Packet {
    /// The full frame: header reservation and payload.
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}
