//! Data plane components
//!
//! Moves packets between two devices: batch read buffers, the direct and
//! queued forwarding strategies, and the shared buffer pool.

mod batch;
mod direct;
mod packet;
mod pool;
mod queued;
mod session;

pub use batch::{BatchBuffers, BatchSlot};
pub use direct::DirectForwarder;
pub use packet::Packet;
pub use pool::BufferPool;
pub use queued::{QueuedForwarder, QueuedReader, QueuedWriter};
pub use session::{ForwardingSession, SessionHandle, Strategy};

use crate::device::Device;

/// "src->dst" label used in logs and metrics
pub(crate) fn direction_label<S: Device, D: Device>(src: &S, dst: &D) -> String {
    format!("{}->{}", src.name(), dst.name())
}
