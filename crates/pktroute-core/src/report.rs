//! Temperature-violation report.
//!
//! Generated by a slave application when a temperature limit is violated
//! and always addressed to the master. The offending temperature is the
//! first byte of the parameter area.

use crate::packet::{DestSrc, Packet, PacketError, PacketFields, PacketKind};

pub const TEMP_VIOLATION_SERVICE_TYPE: u8 = 5;
pub const TEMP_VIOLATION_SERVICE_SUBTYPE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempViolation {
    /// Limit-violating temperature, 0..=255.
    pub temperature: u8,
}

impl TempViolation {
    pub fn new(temperature: u8) -> Self {
        Self { temperature }
    }

    /// Serialize as a report from `src` to the master.
    pub fn serialize(&self, src: DestSrc, seq_cnt: u16) -> Result<Packet, PacketError> {
        Packet::build(
            PacketFields {
                src,
                dest: DestSrc::MASTER,
                kind: PacketKind::Report,
                service_type: TEMP_VIOLATION_SERVICE_TYPE,
                service_subtype: TEMP_VIOLATION_SERVICE_SUBTYPE,
                seq_cnt,
            },
            &[self.temperature],
        )
    }

    /// Returns `None` if the packet is not a temperature-violation report
    /// or carries no parameter byte.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        if !matches!(packet.kind(), Ok(PacketKind::Report)) {
            return None;
        }
        if packet.service() != (TEMP_VIOLATION_SERVICE_TYPE, TEMP_VIOLATION_SERVICE_SUBTYPE) {
            return None;
        }
        packet.params().first().map(|&temperature| Self { temperature })
    }
}
