//! Synchronous value messaging over any [`Channel`].
//!
//! One write and one read over the underlying channel, composed three ways:
//! fire-and-forget, receive-one, and a paired request/response exchange. The
//! layer does not tag or correlate messages; callers keep at most one request
//! outstanding per channel instance, which is all a synchronous boundary
//! crossing needs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Channel, ChannelError};

/// Value-level messaging over a frame channel.
///
/// Values are postcard-encoded. The encoding is treated as an opaque,
/// deterministic, round-tripping transform; a value whose encoding is empty
/// is rejected before it reaches the channel, because a zero-length frame is
/// indistinguishable from "no message" on the wire.
pub struct Messenger<C: Channel> {
    channel: C,
}

impl<C: Channel> Messenger<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Send one value; no reply expected.
    pub fn send_one<T: Serialize>(&self, value: &T) -> Result<(), ChannelError> {
        let bytes = postcard::to_allocvec(value)?;
        if bytes.is_empty() {
            return Err(ChannelError::EmptyFrame);
        }
        self.channel.send_frame(&bytes)
    }

    /// Block until one value is available and return it.
    pub fn recv_one<T: DeserializeOwned>(&self) -> Result<T, ChannelError> {
        let bytes = self.channel.recv_frame()?;
        Ok(postcard::from_bytes(&bytes)?)
    }

    /// Send one value, then block for exactly one value: a synchronous
    /// request/response exchange.
    pub fn send_recv<T: Serialize, R: DeserializeOwned>(
        &self,
        value: &T,
    ) -> Result<R, ChannelError> {
        self.send_one(value)?;
        self.recv_one()
    }

    /// Send a raw 64-bit value as an eight-byte big-endian frame.
    ///
    /// Bootstrap handshakes exchange bare words before any schema exists;
    /// these frames bypass the codec entirely.
    pub fn send_u64(&self, value: u64) -> Result<(), ChannelError> {
        self.channel.send_frame(&value.to_be_bytes())
    }

    /// Receive an eight-byte frame and reassemble it, most significant byte
    /// first.
    pub fn recv_u64(&self) -> Result<u64, ChannelError> {
        let bytes = self.channel.recv_frame()?;
        if bytes.len() != 8 {
            return Err(ChannelError::Corrupt {
                word: bytes.len() as u64,
            });
        }
        let mut value: u64 = 0;
        for byte in &bytes {
            value = (value << 8) + u64::from(*byte);
        }
        Ok(value)
    }

    pub fn close(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

impl<C: Channel + std::fmt::Debug> std::fmt::Debug for Messenger<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("channel", &self.channel)
            .finish()
    }
}
