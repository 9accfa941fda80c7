//! Single-slot holding area for one received packet.
//!
//! Presence is tracked explicitly. A packet whose first byte is zero is a
//! packet like any other; "empty" only ever means "no packet".

use pktroute_core::{DestSrc, Packet};

#[derive(Debug, Default)]
pub struct ReadBuffer {
    slot: Option<Packet>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn is_full(&self) -> bool {
        self.slot.is_some()
    }

    /// Place a packet in the buffer.
    ///
    /// # Panics
    /// If the buffer already holds a packet. Callers must check
    /// [`is_full`](Self::is_full) first; overwriting would lose a packet.
    pub fn store(&mut self, packet: Packet) {
        assert!(
            self.slot.is_none(),
            "read buffer overrun: store into a full buffer"
        );
        self.slot = Some(packet);
    }

    /// Remove and return the buffered packet.
    ///
    /// # Panics
    /// If the buffer is empty.
    pub fn take(&mut self) -> Packet {
        match self.slot.take() {
            Some(p) => p,
            None => panic!("read buffer underrun: take from an empty buffer"),
        }
    }

    /// Source tag of the buffered packet, `None` when empty.
    pub fn peek_source(&self) -> Option<DestSrc> {
        self.slot.as_ref().map(Packet::src)
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}
