//! Channel error taxonomy.

use shm_ring::{Cancelled, FrameError};

/// Errors surfaced by channel and messaging operations.
///
/// Only two variants are recoverable: `Cancelled` (retry on a fresh token)
/// and, arguably, `Codec` (the channel itself is still healthy). `Closed` is
/// terminal by definition, and `Corrupt` is fatal because a retry cannot
/// distinguish corruption from a slow peer. Capacity exhaustion never shows
/// up here at all: a producer that finds the ring full waits.
#[derive(Debug)]
pub enum ChannelError {
    /// A wait was interrupted by shutdown; buffer state is consistent.
    Cancelled,
    /// The channel has been closed. Closing is explicit and terminal.
    Closed,
    /// A control or length word inconsistent with the ring geometry.
    Corrupt { word: u64 },
    /// Payload cannot fit the ring at any consumer lag.
    TooLarge { len: usize, max: usize },
    /// Zero-byte frames collide with the "no message" sentinel.
    EmptyFrame,
    /// Value (de)serialization failed.
    Codec(postcard::Error),
}

impl core::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Closed => write!(f, "channel closed"),
            Self::Corrupt { word } => {
                write!(f, "control word {} inconsistent with channel geometry", word)
            }
            Self::TooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds channel maximum {}", len, max)
            }
            Self::EmptyFrame => write!(f, "empty payloads cannot be framed"),
            Self::Codec(e) => write!(f, "codec error: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<Cancelled> for ChannelError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<FrameError> for ChannelError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Cancelled => Self::Cancelled,
            FrameError::Corrupt { word } => Self::Corrupt { word },
            FrameError::TooLarge { len, max } => Self::TooLarge { len, max },
            FrameError::Empty => Self::EmptyFrame,
        }
    }
}

impl From<postcard::Error> for ChannelError {
    fn from(e: postcard::Error) -> Self {
        Self::Codec(e)
    }
}
