#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod channel;
mod error;
mod mem;
mod messenger;

pub use channel::{Channel, ChannelConfig, SetupError, ShmChannel};
pub use error::ChannelError;
pub use mem::MemChannel;
pub use messenger::Messenger;

// The transport seam, re-exported so embedders wiring up real mappings and
// cancellation do not need a direct shm-ring dependency.
pub use shm_ring::{CancelToken, Cancelled, HeapRegion, Region};
