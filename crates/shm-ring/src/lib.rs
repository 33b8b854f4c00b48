//! Polling-only SPSC byte ring for shared memory channels.
//!
//! This crate implements the transport core of a message channel between two
//! isolation domains (e.g. a trusted enclave and an untrusted host) that share
//! a mapped memory region but no OS synchronization primitives. Everything is
//! driven by spin-polling shared words; nothing here ever parks a thread.
//!
//! # Primitives
//!
//! - [`Region`] / [`HeapRegion`]: raw views of mapped memory. The mapping
//!   facility itself is out of scope; `Region` is the seam it plugs into.
//! - [`SlotView`]: a bounds-checked, 64-byte-slot-indexed view of a region,
//!   including [`SlotView::wait_while`], the sole blocking primitive.
//! - [`RingProducer`] / [`RingConsumer`]: variable-length message frames over
//!   a circular payload region, one writer and one reader per ring.
//! - [`CancelToken`]: the cooperative shutdown signal every spin loop checks.
//!
//! # Publication orderings
//!
//! The protocol relies on exactly two orderings, both enforced by the write
//! paths in this crate:
//!
//! - a frame's length word is stored (release) only after every payload byte
//!   is written, so a polling consumer never sees a partial frame;
//! - the consumer's read position is stored (release) only after every
//!   consumed slot is zeroed, so the producer never reclaims a slot early.
//!
//! # Loom
//!
//! Enable the `loom` feature to model-check the orderings:
//!
//! ```text
//! cargo test -p shm-ring --features loom
//! ```
//!
//! Under `loom` the raw slot-addressed modules are compiled out (loom atomics
//! cannot overlay mapped bytes); the models in `loom_tests` exercise the same
//! publication protocol on loom-tracked cells.

#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod cancel;
pub mod region;
#[cfg(all(not(feature = "loom"), any(test, feature = "alloc")))]
pub mod ring;
#[cfg(not(feature = "loom"))]
pub mod slots;
pub mod sync;

pub use cancel::{CancelToken, Cancelled};
#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
#[cfg(all(not(feature = "loom"), any(test, feature = "alloc")))]
pub use ring::{FrameError, READ_POS_SLOT, RingConsumer, RingLayout, RingProducer};
#[cfg(not(feature = "loom"))]
pub use slots::{LayoutError, SLOT_SIZE, SlotView};
