//! The byte-frame channel contract and its shared-memory implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use shm_ring::{
    CancelToken, FrameError, HeapRegion, LayoutError, Region, RingConsumer, RingLayout,
    RingProducer, SLOT_SIZE, SlotView,
};
use tracing::{debug, trace, warn};

use crate::ChannelError;

/// One side of a duplex frame channel.
///
/// Implementations move whole byte frames; the [`Messenger`](crate::Messenger)
/// layer above turns values into frames. Closing is explicit and terminal:
/// after [`close`](Channel::close) both frame operations fail with
/// [`ChannelError::Closed`], including waits already in flight.
pub trait Channel: Send + Sync {
    /// Send one frame, applying backpressure as needed.
    fn send_frame(&self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Block (by the channel's own wait mechanism) until one frame arrives.
    fn recv_frame(&self) -> Result<Vec<u8>, ChannelError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Construction parameters for a shared-memory channel.
///
/// Both sides of a channel must be constructed with identical values; the
/// geometry is not negotiated over the rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Total slots per ring, reserved prefix included.
    pub buffer_slots: usize,
    /// Control-region size in slots. Slot 0 carries the published read
    /// position; any further reserved slots are left to the embedder.
    pub reserved_slots: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_slots: 1024,
            reserved_slots: 1,
        }
    }
}

impl ChannelConfig {
    /// Validate the geometry.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.reserved_slots < 1 {
            return Err(SetupError::NoReservedSlots);
        }
        if self.buffer_slots < self.reserved_slots + 3 {
            return Err(SetupError::TooFewSlots {
                buffer_slots: self.buffer_slots,
                reserved_slots: self.reserved_slots,
            });
        }
        Ok(())
    }

    /// Bytes each side must map per ring.
    pub fn region_size(&self) -> usize {
        self.buffer_slots * SLOT_SIZE
    }

    /// Largest payload a single frame can carry.
    pub fn max_payload(&self) -> usize {
        self.layout().max_payload_bytes()
    }

    fn layout(&self) -> RingLayout {
        RingLayout::new(self.buffer_slots, self.reserved_slots)
    }
}

/// Errors detected while setting a channel up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// The reserved region must hold at least the read-position slot.
    NoReservedSlots,
    /// Not enough payload slots to frame any message.
    TooFewSlots {
        buffer_slots: usize,
        reserved_slots: usize,
    },
    /// A region failed slot-view validation.
    Region(LayoutError),
    /// A region's size does not match the configured geometry.
    SizeMismatch { expected: usize, found: usize },
}

impl core::fmt::Display for SetupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoReservedSlots => write!(f, "at least one reserved slot is required"),
            Self::TooFewSlots {
                buffer_slots,
                reserved_slots,
            } => write!(
                f,
                "{} slots with {} reserved leave fewer than 3 payload slots",
                buffer_slots, reserved_slots
            ),
            Self::Region(e) => write!(f, "region rejected: {}", e),
            Self::SizeMismatch { expected, found } => {
                write!(f, "region is {} bytes, geometry needs {}", found, expected)
            }
        }
    }
}

impl std::error::Error for SetupError {}

impl From<LayoutError> for SetupError {
    fn from(e: LayoutError) -> Self {
        Self::Region(e)
    }
}

/// A duplex channel over two shared-memory rings.
///
/// Each side writes one region and reads the other; the peer constructs with
/// the region roles swapped. The channel owns a [`CancelToken`] wired into
/// every wait, so closing either unblocks this side's in-flight operations.
pub struct ShmChannel {
    producer: Mutex<RingProducer>,
    consumer: Mutex<RingConsumer>,
    cancel: Arc<CancelToken>,
    closed: AtomicBool,
    /// Backing allocations for in-process pairs; empty when attached to
    /// externally mapped regions.
    _owned: Vec<Arc<HeapRegion>>,
}

impl ShmChannel {
    /// Attach to two mapped regions. `outbound` is the ring this side writes,
    /// `inbound` the ring it reads.
    ///
    /// Constructing the consumer publishes this side's initial read position
    /// into `inbound`, so the peer's producer starts with a valid
    /// flow-control value.
    pub fn new(outbound: Region, inbound: Region, config: ChannelConfig) -> Result<Self, SetupError> {
        Self::attach(outbound, inbound, config, Vec::new())
    }

    /// Build both sides of a channel over owned heap regions, for in-process
    /// use and tests.
    pub fn heap_pair(config: ChannelConfig) -> Result<(Self, Self), SetupError> {
        config.validate()?;
        let a_to_b = Arc::new(HeapRegion::new_zeroed(config.region_size()));
        let b_to_a = Arc::new(HeapRegion::new_zeroed(config.region_size()));
        let a = Self::attach(
            a_to_b.region(),
            b_to_a.region(),
            config,
            vec![a_to_b.clone(), b_to_a.clone()],
        )?;
        let b = Self::attach(b_to_a.region(), a_to_b.region(), config, vec![a_to_b, b_to_a])?;
        Ok((a, b))
    }

    fn attach(
        outbound: Region,
        inbound: Region,
        config: ChannelConfig,
        owned: Vec<Arc<HeapRegion>>,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        for region in [&outbound, &inbound] {
            if region.len() != config.region_size() {
                return Err(SetupError::SizeMismatch {
                    expected: config.region_size(),
                    found: region.len(),
                });
            }
        }
        let layout = config.layout();
        let producer = RingProducer::new(SlotView::new(outbound)?, layout);
        let consumer = RingConsumer::new(SlotView::new(inbound)?, layout);
        debug!(
            buffer_slots = config.buffer_slots,
            reserved_slots = config.reserved_slots,
            "attached shm channel"
        );
        Ok(Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            cancel: Arc::new(CancelToken::new()),
            closed: AtomicBool::new(false),
            _owned: owned,
        })
    }

    /// The token wired into this side's waits. Callers layering timeouts
    /// cancel it from another thread; the pending operation unwinds with
    /// [`ChannelError::Cancelled`] and consistent state.
    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    fn closed_error(&self, e: FrameError) -> ChannelError {
        // A wait torn down by close() surfaces as Cancelled from the ring;
        // callers asked for the channel to go away, so report Closed.
        match e {
            FrameError::Cancelled if self.is_closed() => ChannelError::Closed,
            FrameError::Corrupt { word } => {
                warn!(word, "channel corrupt");
                ChannelError::Corrupt { word }
            }
            other => other.into(),
        }
    }
}

impl Channel for ShmChannel {
    fn send_frame(&self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut producer = self.producer.lock();
        producer
            .write_frame(frame, &self.cancel)
            .map_err(|e| self.closed_error(e))?;
        trace!(len = frame.len(), "frame sent");
        Ok(())
    }

    fn recv_frame(&self) -> Result<Vec<u8>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut consumer = self.consumer.lock();
        let frame = consumer
            .read_frame(&self.cancel)
            .map_err(|e| self.closed_error(e))?;
        trace!(len = frame.len(), "frame received");
        Ok(frame)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cancel.cancel();
            debug!("channel closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ShmChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmChannel")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
