//! pktroute-transport: the socket transport adapter.
//!
//! One [`SocketAdapter`] owns one socket and a single-slot read buffer.
//! Any number of logical channels share it: the adapter demultiplexes by
//! packet source and collapses their lifecycle requests so the socket is
//! opened once and closed once.

pub mod adapter;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod poll;
pub mod read_buffer;

pub use adapter::{AdapterSettings, PollOutcome, SocketAdapter, TcpAdapter, Transport};
pub use endpoint::{Endpoint, SocketEndpoint};
pub use error::TransportError;
pub use lifecycle::{InitOutcome, Lifecycle, LinkState, ShutdownOutcome};
pub use poll::{ChannelPollLoop, PacketConsumer};
pub use read_buffer::ReadBuffer;
