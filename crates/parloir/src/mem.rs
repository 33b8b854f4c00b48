//! In-process channel over ordinary queues.
//!
//! `MemChannel` satisfies the same [`Channel`] contract as the shared-memory
//! implementation without any shared region, which makes it the reference
//! endpoint for conformance tests and a convenient stand-in wherever both
//! sides live in one process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

use parking_lot::Mutex;

use crate::{Channel, ChannelError};

#[derive(Clone)]
pub struct MemChannel {
    inner: Arc<Inner>,
}

struct Inner {
    tx: Sender<Vec<u8>>,
    rx: Mutex<Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemChannel {
    /// Create both sides of an in-process channel.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        let a = Self {
            inner: Arc::new(Inner {
                tx: tx_b,
                rx: Mutex::new(rx_a),
                closed: AtomicBool::new(false),
            }),
        };
        let b = Self {
            inner: Arc::new(Inner {
                tx: tx_a,
                rx: Mutex::new(rx_b),
                closed: AtomicBool::new(false),
            }),
        };
        (a, b)
    }
}

impl Channel for MemChannel {
    fn send_frame(&self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        if frame.is_empty() {
            // Kept in lockstep with the ring, where zero length is the
            // "no message" sentinel.
            return Err(ChannelError::EmptyFrame);
        }
        self.inner
            .tx
            .send(frame.to_vec())
            .map_err(|_| ChannelError::Closed)
    }

    fn recv_frame(&self) -> Result<Vec<u8>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let rx = self.inner.rx.lock();
        rx.recv().map_err(|_| ChannelError::Closed)
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MemChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemChannel")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
