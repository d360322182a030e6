//! Transport channel abstraction.
//!
//! Both engines are written against [`Channel`] so they run unchanged over a
//! server-side WebSocket, a client-side WebSocket, or the in-memory pair
//! used in tests.

use super::constants::MAX_CLOSE_REASON;
use super::protocol::Frame;
use crate::error::{Result, TransferError};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// An ordered, message-framed duplex connection.
pub trait Channel: Send {
    /// Queue one frame for delivery.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next frame. A vanished peer yields `Frame::Close(None)`.
    fn recv(&mut self) -> impl Future<Output = Result<Frame>> + Send;

    /// Close the channel, telling the peer why if a reason is given.
    fn close(&mut self, reason: Option<String>) -> impl Future<Output = ()> + Send;

    /// Bytes accepted by `send` that have not reached the network yet.
    fn buffered_amount(&self) -> usize {
        0
    }
}

/// Weight of a frame for buffered-byte accounting
pub fn frame_len(frame: &Frame) -> usize {
    match frame {
        Frame::Text(text) => text.len(),
        Frame::Binary(data) => data.len(),
        Frame::Close(_) => 0,
    }
}

/// Cut a close reason down to what fits in a close frame, on a char boundary
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut cutoff = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    &reason[..cutoff]
}

/// One end of an in-process channel pair
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
    /// Bytes we sent that the peer has not received yet
    outbound: Arc<AtomicUsize>,
    /// Bytes the peer sent that we have not received yet
    inbound: Arc<AtomicUsize>,
    closed: bool,
}

impl MemoryChannel {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a_to_b = Arc::new(AtomicUsize::new(0));
        let b_to_a = Arc::new(AtomicUsize::new(0));

        let a = Self {
            tx: a_tx,
            rx: a_rx,
            outbound: a_to_b.clone(),
            inbound: b_to_a.clone(),
            closed: false,
        };
        let b = Self {
            tx: b_tx,
            rx: b_rx,
            outbound: b_to_a,
            inbound: a_to_b,
            closed: false,
        };
        (a, b)
    }
}

impl Channel for MemoryChannel {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.closed {
            return Err(TransferError::transport("channel is closed"));
        }
        let len = frame_len(&frame);
        self.outbound.fetch_add(len, Ordering::SeqCst);
        self.tx.send(frame).map_err(|_| {
            self.outbound.fetch_sub(len, Ordering::SeqCst);
            TransferError::transport("peer went away")
        })
    }

    async fn recv(&mut self) -> Result<Frame> {
        match self.rx.recv().await {
            Some(frame) => {
                self.inbound.fetch_sub(frame_len(&frame), Ordering::SeqCst);
                Ok(frame)
            }
            None => Ok(Frame::Close(None)),
        }
    }

    async fn close(&mut self, reason: Option<String>) {
        if self.closed {
            return;
        }
        self.closed = true;
        let reason = reason.map(|r| truncate_reason(&r).to_string());
        let _ = self.tx.send(Frame::Close(reason));
    }

    fn buffered_amount(&self) -> usize {
        self.outbound.load(Ordering::SeqCst)
    }
}
