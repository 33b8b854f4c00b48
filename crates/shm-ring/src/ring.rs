//! The message ring: variable-length frames over a [`SlotView`].
//!
//! A ring is a region split into a reserved control prefix and a circular
//! payload area. Slot 0's word holds the consumer's published read position;
//! slots `[reserved, slots)` carry frames. A frame is one length word (0
//! means "no message") followed by `ceil(len / 64)` payload slots, placed in
//! one of three ways:
//!
//! - **contiguous**: length at `pos`, payload at `pos + 1 ..= pos + needed`;
//! - **wrap at the last slot**: `pos` is the final slot, so the whole payload
//!   sits at the start of the payload area;
//! - **split**: the payload fills the slots up to the end of the region and
//!   continues at the start of the payload area.
//!
//! In ring-position space every frame occupies exactly `needed + 1`
//! consecutive positions, which is what makes the flow-control arithmetic in
//! the producer work.
//!
//! Publication discipline: the producer stores the length word only after the
//! payload copy completes, and the consumer stores its position only after
//! the consumed slots are zeroed. Both stores are the single publication
//! sites in their respective paths.

use alloc::vec;
use alloc::vec::Vec;

use crate::cancel::{CancelToken, Cancelled};
use crate::slots::{SLOT_SIZE, SlotView};
use crate::sync::spin_loop;

/// Slot whose word carries the consumer's published read position.
pub const READ_POS_SLOT: usize = 0;

/// Ring geometry: total slot count and the reserved control prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    slots: usize,
    reserved: usize,
}

impl RingLayout {
    /// Define a ring's geometry.
    ///
    /// Panics on geometry no ring can operate with: fewer than one reserved
    /// slot, or fewer than three payload slots (a length slot, a payload slot
    /// and a free slot). Channel-level configuration validates user input
    /// before it gets here.
    pub fn new(slots: usize, reserved: usize) -> Self {
        assert!(reserved >= 1, "at least one reserved slot is required");
        assert!(
            slots >= reserved + 3,
            "ring needs at least 3 payload slots ({} total, {} reserved)",
            slots,
            reserved
        );
        Self { slots, reserved }
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// First slot of the circular payload area; also the successor of the
    /// final slot.
    #[inline]
    pub fn first_payload_slot(&self) -> usize {
        self.reserved
    }

    /// Number of positions in the payload area.
    #[inline]
    pub fn payload_slots(&self) -> usize {
        self.slots - self.reserved
    }

    /// Largest payload a frame can carry: one position is spent on the length
    /// word, so `payload_slots - 1` slots remain for bytes.
    #[inline]
    pub fn max_payload_bytes(&self) -> usize {
        (self.payload_slots() - 1) * SLOT_SIZE
    }

    /// Ring-position distance from `from` forward to `to`.
    #[inline]
    fn distance(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            self.payload_slots() - (from - to)
        }
    }

    /// Advance a cursor by `n` positions, re-entering the payload area at its
    /// start when it runs off the end of the region.
    #[inline]
    fn advance(&self, pos: usize, n: usize) -> usize {
        let next = pos + n;
        if next >= self.slots {
            next - self.slots + self.reserved
        } else {
            next
        }
    }
}

/// Errors surfaced by frame operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The wait was cancelled; cursor and slot state are unchanged.
    Cancelled,
    /// A length or position word inconsistent with the ring geometry was
    /// observed. Fatal: retrying cannot distinguish corruption from a slow
    /// peer.
    Corrupt { word: u64 },
    /// The payload cannot fit the ring at any consumer lag.
    TooLarge { len: usize, max: usize },
    /// Zero-length payloads collide with the "no message" sentinel.
    Empty,
}

impl From<Cancelled> for FrameError {
    fn from(_: Cancelled) -> Self {
        FrameError::Cancelled
    }
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "wait cancelled"),
            Self::Corrupt { word } => {
                write!(f, "control word {} inconsistent with ring geometry", word)
            }
            Self::TooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds ring maximum {}", len, max)
            }
            Self::Empty => write!(f, "empty payloads cannot be framed"),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for FrameError {}

/// The writing side of a ring.
///
/// Exactly one producer may exist per ring instance; the protocol has no
/// provision for concurrent writers.
#[derive(Debug)]
pub struct RingProducer {
    view: SlotView,
    layout: RingLayout,
    pos: usize,
}

impl RingProducer {
    pub fn new(view: SlotView, layout: RingLayout) -> Self {
        assert_eq!(layout.slots(), view.slots(), "geometry mismatch");
        Self {
            view,
            layout,
            pos: layout.first_payload_slot(),
        }
    }

    /// The next write position (diagnostics and tests).
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The consumer's published read position.
    ///
    /// A zero word means the consumer has not attached yet, which for flow
    /// control is the same as "nothing consumed": its initial position.
    fn read_pos(&self) -> Result<usize, FrameError> {
        let word = self.view.load_word(READ_POS_SLOT);
        if word == 0 {
            return Ok(self.layout.first_payload_slot());
        }
        let pos = word as usize;
        if pos < self.layout.first_payload_slot() || !self.view.contains(pos) {
            return Err(FrameError::Corrupt { word });
        }
        Ok(pos)
    }

    /// Write one frame, spinning for free space as needed.
    ///
    /// Backpressure, not failure: when the claim of `needed + 1` positions
    /// would overlap slots the consumer has not yet published as consumed,
    /// the producer polls the published position until it advances far
    /// enough. Cancellation aborts the wait with nothing written.
    pub fn write_frame(&mut self, payload: &[u8], cancel: &CancelToken) -> Result<(), FrameError> {
        if payload.is_empty() {
            return Err(FrameError::Empty);
        }
        let max = self.layout.max_payload_bytes();
        if payload.len() > max {
            return Err(FrameError::TooLarge {
                len: payload.len(),
                max,
            });
        }

        let needed = self.view.slots_needed(payload.len());
        let claim = needed + 1;
        // Flow control. Positions alone cannot tell an empty ring from a
        // completely full one, so two rules keep the arithmetic unambiguous:
        //
        // - when frames are in flight, a write must leave one position free,
        //   so the cursors only ever coincide on an empty ring or behind a
        //   single frame spanning the whole payload area;
        // - when the cursors coincide, the word at the write position settles
        //   which of those it is: the consumer zeroes a frame's length slot
        //   last, so a zero word here means every claimed slot is zero again.
        //
        // The published position may lag the consumer's real progress, which
        // only ever makes `used` an overestimate; waiting is the safe side.
        loop {
            let read_pos = self.read_pos()?;
            let used = self.layout.distance(read_pos, self.pos);
            let free = if used == 0 {
                self.view.load_word(self.pos) == 0
            } else {
                used + claim < self.layout.payload_slots()
            };
            if free {
                break;
            }
            cancel.check()?;
            spin_loop();
        }

        let first = self.layout.first_payload_slot();
        let last = self.view.slots() - 1;
        if self.pos == last {
            // Not even one payload slot fits after the length word; the
            // whole payload goes to the start of the payload area.
            self.view.write_bytes(first, payload);
        } else if self.view.contains(self.pos + needed) {
            self.view.write_bytes(self.pos + 1, payload);
        } else {
            let wrap_slots = self.view.slots() - self.pos - 1;
            let wrap_bytes = wrap_slots * SLOT_SIZE;
            self.view.write_bytes(self.pos + 1, &payload[..wrap_bytes]);
            self.view.write_bytes(first, &payload[wrap_bytes..]);
        }

        // Publication point: the length word is stored only after every
        // payload byte above, so a polling consumer never observes a frame
        // whose payload is incomplete.
        self.view.store_word(self.pos, payload.len() as u64);
        self.pos = self.layout.advance(self.pos, claim);
        Ok(())
    }
}

/// The reading side of a ring.
///
/// Exactly one consumer may exist per ring instance. Construction publishes
/// the initial read position so the producer starts with a valid flow-control
/// value.
#[derive(Debug)]
pub struct RingConsumer {
    view: SlotView,
    layout: RingLayout,
    pos: usize,
}

impl RingConsumer {
    pub fn new(view: SlotView, layout: RingLayout) -> Self {
        assert_eq!(layout.slots(), view.slots(), "geometry mismatch");
        let consumer = Self {
            view,
            layout,
            pos: layout.first_payload_slot(),
        };
        consumer.publish_pos();
        consumer
    }

    /// The next read position (diagnostics and tests).
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    fn publish_pos(&self) {
        self.view.store_word(READ_POS_SLOT, self.pos as u64);
    }

    /// Read one frame, spinning until a length word is published.
    ///
    /// Cancellation during the wait leaves the cursor and every slot
    /// untouched. A length word exceeding the ring maximum is corruption and
    /// is surfaced without consuming anything.
    pub fn read_frame(&mut self, cancel: &CancelToken) -> Result<Vec<u8>, FrameError> {
        let word = self.view.wait_while(self.pos, 0, cancel)?;
        if word > self.layout.max_payload_bytes() as u64 {
            return Err(FrameError::Corrupt { word });
        }
        let len = word as usize;
        let needed = self.view.slots_needed(len);
        let first = self.layout.first_payload_slot();
        let mut payload = vec![0u8; len];

        // In each arm the payload slots are zeroed before the length slot:
        // the producer takes a zero length word as proof that the whole
        // claim is free again, so the length slot's release store must come
        // after every other zeroed byte.
        if self.pos == self.view.slots() - 1 {
            // Producer was at the final slot; the payload lives at the start
            // of the payload area.
            self.view.read_bytes(first, &mut payload);
            self.view.zero(first, needed);
            self.view.zero(self.pos, 1);
        } else if self.view.contains(self.pos + needed) {
            self.view.read_bytes(self.pos + 1, &mut payload);
            self.view.zero(self.pos + 1, needed);
            self.view.zero(self.pos, 1);
        } else {
            let wrap_slots = self.view.slots() - self.pos - 1;
            let wrap_bytes = wrap_slots * SLOT_SIZE;
            self.view.read_bytes(self.pos + 1, &mut payload[..wrap_bytes]);
            self.view.read_bytes(first, &mut payload[wrap_bytes..]);
            self.view.zero(self.pos + 1, wrap_slots);
            self.view.zero(first, needed - wrap_slots);
            self.view.zero(self.pos, 1);
        }

        self.pos = self.layout.advance(self.pos, needed + 1);
        // Publication point: the position is stored only after the zeroing
        // above, so the producer never reclaims a slot that still holds a
        // stale frame.
        self.publish_pos();
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::HeapRegion;
    use crate::sync::thread;

    fn ring(slots: usize, reserved: usize) -> (HeapRegion, RingProducer, RingConsumer) {
        let owner = HeapRegion::new_zeroed(slots * SLOT_SIZE);
        let view = SlotView::new(owner.region()).unwrap();
        let layout = RingLayout::new(slots, reserved);
        let producer = RingProducer::new(view, layout);
        let consumer = RingConsumer::new(view, layout);
        (owner, producer, consumer)
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn round_trip_contiguous() {
        let (_owner, mut producer, mut consumer) = ring(10, 1);
        let cancel = CancelToken::new();
        let msg = pattern(100, 7);
        producer.write_frame(&msg, &cancel).unwrap();
        assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
        // 2 payload slots + 1 length slot.
        assert_eq!(consumer.pos(), 4);
        assert_eq!(producer.pos(), 4);
    }

    #[test]
    fn consumer_publishes_initial_position() {
        let owner = HeapRegion::new_zeroed(10 * SLOT_SIZE);
        let view = SlotView::new(owner.region()).unwrap();
        let layout = RingLayout::new(10, 2);
        let _consumer = RingConsumer::new(view, layout);
        assert_eq!(view.load_word(READ_POS_SLOT), 2);
    }

    #[test]
    fn wrap_at_last_slot_reads_from_payload_start() {
        // The end-to-end scenario: 10 slots, 1 reserved, cursors driven to
        // the final slot, then a 70-byte frame (2 payload slots).
        let (_owner, mut producer, mut consumer) = ring(10, 1);
        let cancel = CancelToken::new();

        // Claim 8 positions (7 payload slots + length) to land on slot 9.
        let filler = pattern(7 * SLOT_SIZE, 1);
        producer.write_frame(&filler, &cancel).unwrap();
        assert_eq!(consumer.read_frame(&cancel).unwrap(), filler);
        assert_eq!(producer.pos(), 9);
        assert_eq!(consumer.pos(), 9);

        let msg = pattern(70, 2);
        producer.write_frame(&msg, &cancel).unwrap();

        let view = consumer.view;
        assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
        // Length slot 9 and payload slots 1-2 are zeroed; the next frame
        // starts right after the payload, so position 3 is republished.
        assert_eq!(view.load_word(9), 0);
        let mut bytes = [0xAAu8; 2 * SLOT_SIZE];
        view.read_bytes(1, &mut bytes);
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(consumer.pos(), 3);
        assert_eq!(view.load_word(READ_POS_SLOT), 3);
        assert_eq!(producer.pos(), 3);
    }

    #[test]
    fn split_frame_straddles_the_wrap() {
        let (_owner, mut producer, mut consumer) = ring(10, 1);
        let cancel = CancelToken::new();

        // Land the cursors on slot 8: claim 7 (6 payload slots + length).
        let filler = pattern(6 * SLOT_SIZE, 3);
        producer.write_frame(&filler, &cancel).unwrap();
        consumer.read_frame(&cancel).unwrap();
        assert_eq!(producer.pos(), 8);

        // 3 payload slots from position 8: slot 9 holds the first slot's
        // worth, the rest wraps to slots 1-2.
        let msg = pattern(3 * SLOT_SIZE - 10, 4);
        producer.write_frame(&msg, &cancel).unwrap();
        assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
        assert_eq!(consumer.pos(), 3);
        assert_eq!(producer.pos(), 3);
    }

    #[test]
    fn every_consumed_slot_is_zero() {
        let (owner, mut producer, mut consumer) = ring(12, 2);
        let cancel = CancelToken::new();
        for seed in 0..20 {
            let msg = pattern(1 + (seed as usize * 53) % 500, seed);
            producer.write_frame(&msg, &cancel).unwrap();
            assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
        }
        // Payload area fully consumed: everything except the reserved prefix
        // must be zero.
        let view = SlotView::new(owner.region()).unwrap();
        let mut bytes = vec![0xAAu8; 10 * SLOT_SIZE];
        view.read_bytes(2, &mut bytes);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn positions_advance_in_lockstep() {
        let (_owner, mut producer, mut consumer) = ring(11, 1);
        let cancel = CancelToken::new();
        for seed in 0..50 {
            let len = 1 + (seed as usize * 97) % 450;
            let msg = pattern(len, seed);
            producer.write_frame(&msg, &cancel).unwrap();
            assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
            assert_eq!(producer.pos(), consumer.pos());
        }
    }

    #[test]
    fn producer_waits_for_the_consumer() {
        let (_owner, mut producer, mut consumer) = ring(5, 1);
        let cancel = CancelToken::new();
        // P = 4; a 2-slot payload claims 3 positions.
        let first = pattern(2 * SLOT_SIZE, 5);
        producer.write_frame(&first, &cancel).unwrap();

        // A second frame cannot fit while the first is unconsumed.
        let blocked = CancelToken::new();
        blocked.cancel();
        let second = pattern(SLOT_SIZE, 6);
        assert_eq!(
            producer.write_frame(&second, &blocked),
            Err(FrameError::Cancelled)
        );

        assert_eq!(consumer.read_frame(&cancel).unwrap(), first);
        producer.write_frame(&second, &cancel).unwrap();
        assert_eq!(consumer.read_frame(&cancel).unwrap(), second);
    }

    #[test]
    fn full_payload_area_frame_round_trips() {
        // A maximum-size frame claims every payload position, which makes
        // the producer and consumer cursors coincide while the frame is in
        // flight. The length word at the producer's position disambiguates.
        let (_owner, mut producer, mut consumer) = ring(10, 1);
        let cancel = CancelToken::new();
        let max = 8 * SLOT_SIZE;
        let msg = pattern(max, 9);
        producer.write_frame(&msg, &cancel).unwrap();
        assert_eq!(producer.pos(), 1);

        let blocked = CancelToken::new();
        blocked.cancel();
        assert_eq!(
            producer.write_frame(&[1], &blocked),
            Err(FrameError::Cancelled)
        );

        assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
        producer.write_frame(&[1], &cancel).unwrap();
        assert_eq!(consumer.read_frame(&cancel).unwrap(), vec![1]);
    }

    #[test]
    fn cancelled_read_leaves_state_unchanged() {
        let (_owner, mut producer, mut consumer) = ring(8, 1);
        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert_eq!(consumer.read_frame(&cancelled), Err(FrameError::Cancelled));
        assert_eq!(consumer.pos(), 1);

        let cancel = CancelToken::new();
        let msg = pattern(40, 11);
        producer.write_frame(&msg, &cancel).unwrap();
        assert_eq!(consumer.read_frame(&cancel).unwrap(), msg);
    }

    #[test]
    fn rejects_unframeable_payloads() {
        let (_owner, mut producer, _consumer) = ring(6, 1);
        let cancel = CancelToken::new();
        assert_eq!(producer.write_frame(&[], &cancel), Err(FrameError::Empty));
        let max = 4 * SLOT_SIZE;
        let big = vec![0u8; max + 1];
        assert_eq!(
            producer.write_frame(&big, &cancel),
            Err(FrameError::TooLarge { len: max + 1, max })
        );
    }

    #[test]
    fn oversized_length_word_is_corruption() {
        let (owner, _producer, mut consumer) = ring(6, 1);
        let cancel = CancelToken::new();
        let view = SlotView::new(owner.region()).unwrap();
        view.store_word(1, 100_000);
        assert_eq!(
            consumer.read_frame(&cancel),
            Err(FrameError::Corrupt { word: 100_000 })
        );
    }

    #[test]
    fn bogus_read_position_is_corruption() {
        let (owner, mut producer, _consumer) = ring(6, 1);
        let cancel = CancelToken::new();
        let view = SlotView::new(owner.region()).unwrap();
        view.store_word(READ_POS_SLOT, 77);
        assert_eq!(
            producer.write_frame(&[1, 2, 3], &cancel),
            Err(FrameError::Corrupt { word: 77 })
        );
    }

    #[test]
    fn slow_consumer_applies_backpressure() {
        // Producer runs far ahead of a deliberately slow consumer; every
        // frame must still arrive intact and in order.
        let owner = HeapRegion::new_zeroed(8 * SLOT_SIZE);
        let view = SlotView::new(owner.region()).unwrap();
        let layout = RingLayout::new(8, 1);
        let mut producer = RingProducer::new(view, layout);
        let mut consumer = RingConsumer::new(view, layout);
        let cancel = CancelToken::new();

        const FRAMES: usize = 200;
        thread::scope(|scope| {
            let cancel = &cancel;
            scope.spawn(move || {
                for seed in 0..FRAMES {
                    let msg = pattern(1 + (seed * 61) % 300, seed as u8);
                    producer.write_frame(&msg, cancel).unwrap();
                }
            });
            scope.spawn(move || {
                for seed in 0..FRAMES {
                    if seed % 16 == 0 {
                        thread::yield_now();
                    }
                    let msg = pattern(1 + (seed * 61) % 300, seed as u8);
                    assert_eq!(consumer.read_frame(cancel).unwrap(), msg);
                }
            });
        });
    }
}
