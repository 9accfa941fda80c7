//! pktroute-core: packet layout, routing tags, reports, and node configuration.
//! The transport and daemon crates depend on this one.

pub mod config;
pub mod packet;
pub mod report;

pub use packet::{DestSrc, Packet, PacketFields, PacketKind};
