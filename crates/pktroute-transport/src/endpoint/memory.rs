//! In-process endpoint.
//!
//! A [`MemoryLink`] is the "wire": packets pushed into it are read by its
//! endpoint, packets the endpoint writes are collected for inspection. The
//! link also counts opens, closes and reads so callers can observe exactly
//! how often the adapter touched its socket.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use pktroute_core::Packet;

use super::Endpoint;
use crate::error::TransportError;

#[derive(Debug, Default)]
struct LinkState {
    inbound: VecDeque<Packet>,
    outbound: Vec<Packet>,
    open: bool,
    peer_closed: bool,
    refuse_open: bool,
    opens: usize,
    closes: usize,
    reads: usize,
}

/// Shared handle to the link; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<LinkState>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn endpoint(&self) -> MemoryEndpoint {
        MemoryEndpoint { link: self.clone() }
    }

    /// Queue a packet for the endpoint to read.
    pub fn push_inbound(&self, packet: Packet) {
        self.lock().inbound.push_back(packet);
    }

    pub fn inbound_len(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Drain everything the endpoint has written so far.
    pub fn take_outbound(&self) -> Vec<Packet> {
        std::mem::take(&mut self.lock().outbound)
    }

    /// Make every following `open` fail.
    pub fn refuse_open(&self, refuse: bool) {
        self.lock().refuse_open = refuse;
    }

    /// Simulate the remote side going away: writes fail from now on.
    pub fn close_peer(&self) {
        self.lock().peer_closed = true;
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Number of read attempts, successful or not.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }
}

#[derive(Debug)]
pub struct MemoryEndpoint {
    link: MemoryLink,
}

impl Endpoint for MemoryEndpoint {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut s = self.link.lock();
        if s.refuse_open {
            return Err(TransportError::connection(
                "connect",
                io::Error::new(io::ErrorKind::ConnectionRefused, "memory link refused"),
            ));
        }
        s.opens += 1;
        s.open = true;
        Ok(())
    }

    fn read_nonblocking(&mut self) -> Option<Packet> {
        let mut s = self.link.lock();
        s.reads += 1;
        if !s.open {
            return None;
        }
        s.inbound.pop_front()
    }

    fn write_nonblocking(&mut self, packet: &Packet) -> bool {
        let mut s = self.link.lock();
        if !s.open || s.peer_closed {
            return false;
        }
        s.outbound.push(packet.clone());
        true
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut s = self.link.lock();
        s.closes += 1;
        s.open = false;
        Ok(())
    }
}
