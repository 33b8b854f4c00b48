//! The aligned slot view: slot-indexed operations over a [`Region`].
//!
//! Every position, length and copy in the ring protocol is expressed in units
//! of 64-byte slots. This module owns the translation from slot indices to
//! byte offsets, so the layers above never do pointer arithmetic; an invalid
//! slot index is rejected here rather than trusted downstream.
//!
//! The first 8 bytes of a slot are its *word*, and words are the only bytes
//! both sides access concurrently: they are read and written exclusively as
//! acquire/release atomics. All other bytes of a slot are only touched by the
//! side that currently owns it under the ring protocol.

use crate::cancel::{CancelToken, Cancelled};
use crate::region::Region;
use crate::sync::{AtomicU64, Ordering, spin_loop};

/// Slot width in bytes. Fixed by the protocol; both sides of a channel must
/// agree on it, so it is a compile-time constant rather than configuration.
pub const SLOT_SIZE: usize = 64;

/// Errors detected when attaching a view to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Region length is zero or not a whole number of slots.
    BadLength { len: usize },
    /// Region base address is not slot-aligned.
    Misaligned,
}

impl core::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadLength { len } => {
                write!(
                    f,
                    "region length {} is not a positive multiple of {}",
                    len, SLOT_SIZE
                )
            }
            Self::Misaligned => write!(f, "region base is not {}-byte aligned", SLOT_SIZE),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for LayoutError {}

/// A slot-indexed view of a shared region.
///
/// Copies of a view are cheap and refer to the same memory; the producer and
/// consumer of a ring each hold one.
#[derive(Debug, Clone, Copy)]
pub struct SlotView {
    region: Region,
    slots: usize,
}

impl SlotView {
    /// Attach a view to a region, validating its geometry.
    pub fn new(region: Region) -> Result<Self, LayoutError> {
        let len = region.len();
        if len == 0 || len % SLOT_SIZE != 0 {
            return Err(LayoutError::BadLength { len });
        }
        if region.base() as usize % SLOT_SIZE != 0 {
            return Err(LayoutError::Misaligned);
        }
        Ok(Self {
            region,
            slots: len / SLOT_SIZE,
        })
    }

    /// Total number of slots in the view.
    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Slot width in bytes.
    #[inline]
    pub fn alignment(&self) -> usize {
        SLOT_SIZE
    }

    /// Number of slots a payload of `len` bytes occupies.
    #[inline]
    pub fn slots_needed(&self, len: usize) -> usize {
        len.div_ceil(SLOT_SIZE)
    }

    /// Whether `slot` is a valid index into this view.
    #[inline]
    pub fn contains(&self, slot: usize) -> bool {
        slot < self.slots
    }

    #[inline]
    fn word(&self, slot: usize) -> &AtomicU64 {
        assert!(self.contains(slot), "slot {} out of bounds", slot);
        let ptr = self.region.offset(slot * SLOT_SIZE);
        // SAFETY: the offset is in-bounds and slot-aligned (the region base is
        // 64-byte aligned), so the first 8 bytes of the slot form a valid,
        // aligned AtomicU64. Words are only ever accessed through this method,
        // so there are no mixed-size concurrent accesses to them.
        unsafe { &*(ptr as *const AtomicU64) }
    }

    /// Acquire-load the word at `slot`.
    #[inline]
    pub fn load_word(&self, slot: usize) -> u64 {
        self.word(slot).load(Ordering::Acquire)
    }

    /// Release-store the word at `slot`.
    ///
    /// This is the publication primitive: a store here makes every prior
    /// write by this thread visible to a peer that acquire-loads the word.
    #[inline]
    pub fn store_word(&self, slot: usize, value: u64) {
        self.word(slot).store(value, Ordering::Release);
    }

    /// Copy `dst.len()` bytes out of the view, starting at `slot`'s first
    /// byte and spanning as many slots as the range needs.
    pub fn read_bytes(&self, slot: usize, dst: &mut [u8]) {
        let start = slot * SLOT_SIZE;
        assert!(
            self.contains(slot) && start + dst.len() <= self.region.len(),
            "read of {} bytes at slot {} out of bounds",
            dst.len(),
            slot
        );
        // SAFETY: range is in-bounds; the caller owns these slots under the
        // ring protocol, so no concurrent writer exists.
        unsafe {
            core::ptr::copy_nonoverlapping(self.region.offset(start), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Copy `src` into the view, starting at `slot`'s first byte.
    pub fn write_bytes(&self, slot: usize, src: &[u8]) {
        let start = slot * SLOT_SIZE;
        assert!(
            self.contains(slot) && start + src.len() <= self.region.len(),
            "write of {} bytes at slot {} out of bounds",
            src.len(),
            slot
        );
        // SAFETY: range is in-bounds; the caller owns these slots under the
        // ring protocol, so no concurrent reader exists until publication.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.region.offset(start), src.len());
        }
    }

    /// Overwrite `count` slots starting at `slot` with zeroes, marking them
    /// consumed. Each slot's word is cleared with a release store; the
    /// remainder with plain writes (the peer only reads those bytes after a
    /// later position publication orders them).
    pub fn zero(&self, slot: usize, count: usize) {
        assert!(
            slot + count <= self.slots,
            "zero of {} slots at {} out of bounds",
            count,
            slot
        );
        for s in slot..slot + count {
            self.store_word(s, 0);
            // SAFETY: in-bounds; this side owns the slot until it republishes
            // its position.
            unsafe {
                core::ptr::write_bytes(self.region.offset(s * SLOT_SIZE + 8), 0, SLOT_SIZE - 8);
            }
        }
    }

    /// Spin until the word at `slot` no longer equals `sentinel`, returning
    /// the first differing value observed.
    ///
    /// This is the only way a side waits for its peer. The loop never parks:
    /// no blocking primitive exists across the trust boundary. `cancel` is
    /// checked every iteration so a shutdown can unwind a side whose peer is
    /// gone or idle.
    pub fn wait_while(
        &self,
        slot: usize,
        sentinel: u64,
        cancel: &CancelToken,
    ) -> Result<u64, Cancelled> {
        loop {
            let value = self.load_word(slot);
            if value != sentinel {
                return Ok(value);
            }
            cancel.check()?;
            spin_loop();
        }
    }
}
