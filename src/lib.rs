//! tunpatch - TUN patch cable
//!
//! Forwards packets in both directions between two TUN interfaces using
//! batched reads and writes, with a direct and a queued forwarding strategy.

pub mod config;
pub mod dataplane;
pub mod device;
pub mod error;
pub mod telemetry;

pub use error::{Error, Result};
