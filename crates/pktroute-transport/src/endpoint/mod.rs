//! Socket endpoints: the OS-level connection behind an adapter.
//!
//! [`Endpoint`] is the capability an adapter needs from its socket. It is
//! implemented per role: [`ClientSocket`] connects out, [`ServerSocket`]
//! listens and accepts its peer. [`MemoryEndpoint`] is an in-process
//! stand-in used to wire nodes together without the network.
//!
//! All reads and writes are non-blocking. A read returns at most one whole
//! packet; a write either hands the whole packet to the kernel or fails.

mod memory;
mod tcp;

pub use memory::{MemoryEndpoint, MemoryLink};
pub use tcp::{ClientSocket, ServerSocket};

use pktroute_core::config::SocketRole;
use pktroute_core::Packet;

use crate::adapter::AdapterSettings;
use crate::error::TransportError;

pub trait Endpoint: Send {
    /// Create the socket. Clients connect to their peer, servers bind and
    /// listen. Failures are returned, never fatal.
    fn open(&mut self) -> Result<(), TransportError>;

    /// One packet if a complete one is waiting, otherwise `None`.
    fn read_nonblocking(&mut self) -> Option<Packet>;

    /// `true` if the whole packet was written.
    fn write_nonblocking(&mut self, packet: &Packet) -> bool;

    /// Release the OS resources.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// The TCP endpoint for either role, chosen from adapter settings.
#[derive(Debug)]
pub enum SocketEndpoint {
    Client(ClientSocket),
    Server(ServerSocket),
}

impl SocketEndpoint {
    pub fn for_settings(settings: &AdapterSettings) -> Self {
        match settings.role {
            SocketRole::Client => SocketEndpoint::Client(ClientSocket::new(
                settings.host.clone(),
                settings.port,
                settings.max_packet_len,
            )),
            SocketRole::Server => SocketEndpoint::Server(ServerSocket::new(
                settings.host.clone(),
                settings.port,
                settings.max_packet_len,
            )),
        }
    }
}

impl Endpoint for SocketEndpoint {
    fn open(&mut self) -> Result<(), TransportError> {
        match self {
            SocketEndpoint::Client(s) => s.open(),
            SocketEndpoint::Server(s) => s.open(),
        }
    }

    fn read_nonblocking(&mut self) -> Option<Packet> {
        match self {
            SocketEndpoint::Client(s) => s.read_nonblocking(),
            SocketEndpoint::Server(s) => s.read_nonblocking(),
        }
    }

    fn write_nonblocking(&mut self, packet: &Packet) -> bool {
        match self {
            SocketEndpoint::Client(s) => s.write_nonblocking(packet),
            SocketEndpoint::Server(s) => s.write_nonblocking(packet),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self {
            SocketEndpoint::Client(s) => s.close(),
            SocketEndpoint::Server(s) => s.close(),
        }
    }
}
