//! The seam between the protocol and a CAN driver.

use std::{collections::VecDeque, convert::Infallible};

use crate::protocol::CanFrame;

/// A CAN interface. Both directions are non-blocking: `WouldBlock` means the mailbox is full
/// (transmit) or nothing has arrived (receive).
pub trait FrameTransport {
    type Error: core::fmt::Debug;

    fn transmit(&mut self, frame: &CanFrame) -> nb::Result<(), Self::Error>;

    /// A received frame, and its reception time in microseconds from a monotonic clock.
    fn receive(&mut self) -> nb::Result<(CanFrame, u64), Self::Error>;
}

/// Frames in memory: what's transmitted is kept for inspection, and received frames are
/// whatever was injected. Useful for tests and for wiring nodes together in one process.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<CanFrame>,
    inbox: VecDeque<(CanFrame, u64)>,
    /// Transmit reports `WouldBlock` once this many frames are waiting in `sent`.
    capacity: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose transmit mailbox fills up after `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Default::default()
        }
    }

    /// Queue a frame for `receive`.
    pub fn inject(&mut self, frame: CanFrame, timestamp_us: u64) {
        self.inbox.push_back((frame, timestamp_us));
    }

    /// Everything transmitted since the last call.
    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }

    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    pub fn pending_rx(&self) -> usize {
        self.inbox.len()
    }
}

impl FrameTransport for MemoryTransport {
    type Error = Infallible;

    fn transmit(&mut self, frame: &CanFrame) -> nb::Result<(), Infallible> {
        if self.capacity.is_some_and(|c| self.sent.len() >= c) {
            return Err(nb::Error::WouldBlock);
        }
        self.sent.push(*frame);
        Ok(())
    }

    fn receive(&mut self) -> nb::Result<(CanFrame, u64), Infallible> {
        self.inbox.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback() {
        let mut t = MemoryTransport::new();
        let frame = CanFrame::new_extended(0x1234, &[1, 0xC0]);

        assert_eq!(t.receive(), Err(nb::Error::WouldBlock));
        t.inject(frame, 42);
        assert_eq!(t.receive(), Ok((frame, 42)));

        t.transmit(&frame).unwrap();
        assert_eq!(t.sent(), &[frame]);
        assert_eq!(t.take_sent(), vec![frame]);
        assert!(t.sent().is_empty());
    }

    #[test]
    fn test_capacity() {
        let mut t = MemoryTransport::with_capacity(1);
        let frame = CanFrame::new_extended(1, &[0xC0]);
        assert_eq!(t.transmit(&frame), Ok(()));
        assert_eq!(t.transmit(&frame), Err(nb::Error::WouldBlock));
        t.take_sent();
        assert_eq!(t.transmit(&frame), Ok(()));
    }
}
