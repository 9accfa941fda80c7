//! Packet traffic over a loopback TCP connection.

use crate::*;

#[test]
fn test_round_trip_is_byte_identical() {
    let (server, client) = connected_pair().unwrap();
    let sent = packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 7, &[0xde, 0xad, 0xbe, 0xef]);

    assert!(client.handover(&sent));
    let received = collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();

    assert_eq!(received.as_bytes(), sent.as_bytes());
    assert_eq!(received.src(), DestSrc::SLAVE_2);
    assert_eq!(received.dest(), DestSrc::SLAVE_1);
}

#[test]
fn test_both_directions() {
    let (server, client) = connected_pair().unwrap();

    // The server accepts its peer on first use, so read before writing.
    let up = packet(DestSrc::SLAVE_2, DestSrc::MASTER, 1, &[]);
    assert!(client.handover(&up));
    collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();

    let down = packet(DestSrc::MASTER, DestSrc::SLAVE_2, 2, &[9]);
    assert!(server.handover(&down));
    let received = collect_within(&*client, DestSrc::MASTER, WAIT).unwrap();
    assert_eq!(received, down);
}

#[test]
fn test_largest_packet_crosses_the_wire() {
    let (server, client) = connected_pair().unwrap();
    let params = vec![0xa5; MAX_PACKET_LEN - pktroute_core::packet::HEADER_LEN];
    let sent = packet(DestSrc::MASTER, DestSrc::SLAVE_1, 255, &params);
    assert_eq!(sent.len(), 255);

    assert!(client.handover(&sent));
    let received = collect_within(&*server, DestSrc::MASTER, WAIT).unwrap();
    assert_eq!(received.len(), 255);
    assert_eq!(received, sent);
}

/// Two channels on one server adapter; two packets arrive back to back,
/// the first for the channel polled second.
#[test]
fn test_shared_socket_demultiplexes_by_source() {
    let (server, client) = connected_pair().unwrap();
    let p1 = packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 1, &[1]);
    let p2 = packet(DestSrc::MASTER, DestSrc::SLAVE_1, 2, &[2]);
    assert!(client.handover(&p1));
    assert!(client.handover(&p2));

    let mut collected = Vec::new();
    wait_for_condition(WAIT, || {
        for src in [DestSrc::MASTER, DestSrc::SLAVE_2] {
            if server.is_packet_available(src) {
                let p = server.collect(src).expect("available packet must be collectable");
                assert_eq!(p.src(), src, "channel received another source's packet");
                collected.push(p);
            }
        }
        collected.len() == 2
    })
    .unwrap();

    // Arrival order is kept even though master was polled first.
    assert_eq!(collected, vec![p1, p2]);
}

#[test]
fn test_many_packets_in_order() {
    let (server, client) = connected_pair().unwrap();
    for seq in 0..50u16 {
        let src = if seq % 3 == 0 { DestSrc::MASTER } else { DestSrc::SLAVE_2 };
        assert!(client.handover(&packet(src, DestSrc::SLAVE_1, seq, &seq.to_be_bytes())));
    }

    let mut seqs = Vec::new();
    wait_for_condition(WAIT, || {
        for src in [DestSrc::MASTER, DestSrc::SLAVE_2] {
            if server.is_packet_available(src) {
                if let Some(p) = server.collect(src) {
                    seqs.push(p.seq_cnt());
                }
            }
        }
        seqs.len() == 50
    })
    .unwrap();
    assert_eq!(seqs, (0..50).collect::<Vec<_>>());
}

/// Writing after the peer has gone reports "not sent" instead of failing
/// hard or panicking.
#[test]
fn test_write_after_peer_close() {
    let (server, client) = connected_pair().unwrap();
    assert!(client.handover(&packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 1, &[])));
    collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();

    client.request_shutdown().unwrap();

    let p = packet(DestSrc::MASTER, DestSrc::SLAVE_2, 2, &[]);
    wait_for_condition(WAIT, || !server.handover(&p)).unwrap();
    // And it stays that way.
    assert!(!server.handover(&p));
}

#[test]
fn test_server_accepts_next_peer() {
    let (server, first) = connected_pair().unwrap();
    assert!(first.handover(&packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 1, &[])));
    collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();
    drop(first);

    let port = server.local_addr().expect("server is listening").port();
    let second = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "second",
        SocketRole::Client,
        port,
    ))));
    second.request_init().unwrap();
    assert!(second.handover(&packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 2, &[])));

    let p = collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();
    assert_eq!(p.seq_cnt(), 2);
}
