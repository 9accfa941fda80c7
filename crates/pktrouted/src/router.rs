//! Destination routing for collected packets.

use std::collections::HashMap;
use std::sync::Arc;

use pktroute_core::report::TempViolation;
use pktroute_core::{DestSrc, Packet};

use crate::stream::OutStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Addressed to this node.
    Local,
    /// Queued on the out-stream for this destination.
    Forwarded(DestSrc),
    /// Dropped: no out-stream, or its backlog was full.
    Dropped,
}

pub struct Router {
    app_id: DestSrc,
    out: HashMap<DestSrc, Arc<OutStream>>,
}

impl Router {
    pub fn new(app_id: DestSrc) -> Self {
        Self {
            app_id,
            out: HashMap::new(),
        }
    }

    pub fn add_out_stream(&mut self, stream: Arc<OutStream>) {
        self.out.insert(stream.dest(), stream);
    }

    pub fn route(&self, packet: Packet) -> Route {
        let dest = packet.dest();
        if dest == self.app_id {
            deliver_local(&packet);
            return Route::Local;
        }
        match self.out.get(&dest) {
            Some(stream) => {
                if stream.submit(packet) {
                    Route::Forwarded(dest)
                } else {
                    Route::Dropped
                }
            }
            None => {
                tracing::warn!(
                    src = %packet.src(),
                    %dest,
                    seq_cnt = packet.seq_cnt(),
                    "no route for destination, packet dropped"
                );
                Route::Dropped
            }
        }
    }
}

fn deliver_local(packet: &Packet) {
    if let Some(report) = TempViolation::from_packet(packet) {
        tracing::info!(
            seq_cnt = packet.seq_cnt(),
            src = %packet.src(),
            temperature = report.temperature,
            "temperature violation report"
        );
        return;
    }
    let (service_type, service_subtype) = packet.service();
    tracing::debug!(
        src = %packet.src(),
        service_type,
        service_subtype,
        seq_cnt = packet.seq_cnt(),
        params = %hex::encode(packet.params()),
        "packet delivered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktroute_core::config::SocketRole;
    use pktroute_core::{PacketFields, PacketKind};
    use pktroute_transport::endpoint::MemoryLink;
    use pktroute_transport::{AdapterSettings, SocketAdapter, Transport};

    fn out_stream(dest: DestSrc) -> Arc<OutStream> {
        let link = MemoryLink::new();
        let adapter: Arc<dyn Transport> = Arc::new(SocketAdapter::new(
            AdapterSettings {
                name: "router-test".to_string(),
                role: SocketRole::Client,
                host: "localhost".to_string(),
                port: 9400,
                max_packet_len: 255,
            },
            link.endpoint(),
        ));
        Arc::new(OutStream::new(dest, SocketRole::Client, adapter))
    }

    fn packet(dest: DestSrc) -> Packet {
        Packet::build(
            PacketFields {
                src: DestSrc::SLAVE_2,
                dest,
                kind: PacketKind::Report,
                service_type: 3,
                service_subtype: 25,
                seq_cnt: 4,
            },
            &[1, 2],
        )
        .unwrap()
    }

    #[test]
    fn packets_for_this_node_are_local() {
        let router = Router::new(DestSrc::MASTER);
        assert_eq!(router.route(packet(DestSrc::MASTER)), Route::Local);

        let report = TempViolation::new(91).serialize(DestSrc::SLAVE_2, 1).unwrap();
        assert_eq!(router.route(report), Route::Local);
    }

    #[test]
    fn other_destinations_go_to_their_out_stream() {
        let mut router = Router::new(DestSrc::SLAVE_1);
        let to_master = out_stream(DestSrc::MASTER);
        router.add_out_stream(to_master.clone());

        assert_eq!(
            router.route(packet(DestSrc::MASTER)),
            Route::Forwarded(DestSrc::MASTER)
        );
        assert_eq!(to_master.pending(), 1);
    }

    #[test]
    fn unknown_destination_is_dropped() {
        let mut router = Router::new(DestSrc::SLAVE_1);
        router.add_out_stream(out_stream(DestSrc::MASTER));
        assert_eq!(router.route(packet(DestSrc(77))), Route::Dropped);
    }
}
