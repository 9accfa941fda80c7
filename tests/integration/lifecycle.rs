//! Socket lifecycle against the real network stack.

use crate::*;

use pktroute_transport::{InitOutcome, LinkState, ShutdownOutcome, TransportError};

#[test]
fn test_channels_share_one_listening_socket() {
    let port = free_port().unwrap();
    let server = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "server",
        SocketRole::Server,
        port,
    ))));

    // Two channels bound to the same adapter initialize in turn.
    assert_eq!(server.request_init().unwrap(), InitOutcome::Opened);
    assert_eq!(server.request_init().unwrap(), InitOutcome::AlreadyReady);
    assert_eq!(server.local_addr().map(|a| a.port()), Some(port));

    // A single peer connection serves both.
    let client = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "client",
        SocketRole::Client,
        port,
    ))));
    client.request_init().unwrap();
    assert!(client.handover(&packet(DestSrc::MASTER, DestSrc::SLAVE_1, 1, &[])));
    assert!(client.handover(&packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 2, &[])));
    collect_within(&*server, DestSrc::MASTER, WAIT).unwrap();
    collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();
}

#[test]
fn test_oversized_limit_fails_init() {
    let port = free_port().unwrap();
    let mut s = settings("server", SocketRole::Server, port);
    s.max_packet_len = 256;
    let server = TcpAdapter::tcp(s);

    let err = server.request_init().unwrap_err();
    assert!(matches!(err, TransportError::Configuration(_)), "{err}");
    assert_eq!(server.state(), LinkState::Uninitialized);
    assert_eq!(server.local_addr(), None, "nothing was bound");
}

#[test]
fn test_client_init_fails_without_server_then_retries() {
    let port = free_port().unwrap();
    let client = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "client",
        SocketRole::Client,
        port,
    ))));

    let err = client.request_init().unwrap_err();
    assert!(matches!(err, TransportError::Connection { .. }), "{err}");
    assert!(!client.handover(&packet(DestSrc::MASTER, DestSrc::SLAVE_1, 1, &[])));

    let server = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "server",
        SocketRole::Server,
        port,
    ))));
    server.request_init().unwrap();
    assert_eq!(client.request_init().unwrap(), InitOutcome::Opened);
}

#[test]
fn test_shutdown_is_idempotent_and_releases_port() {
    let port = free_port().unwrap();
    let server = TcpAdapter::tcp(settings("server", SocketRole::Server, port));
    server.request_init().unwrap();

    assert_eq!(server.request_shutdown().unwrap(), ShutdownOutcome::Closed);
    assert_eq!(server.request_shutdown().unwrap(), ShutdownOutcome::AlreadyDown);
    assert_eq!(server.request_shutdown().unwrap(), ShutdownOutcome::AlreadyDown);
    assert_eq!(server.state(), LinkState::Closed);

    // The port can be bound again, by a new adapter or by reopening.
    let other = TcpAdapter::tcp(settings("other", SocketRole::Server, port));
    other.request_init().unwrap();
    other.request_shutdown().unwrap();
    assert_eq!(server.request_init().unwrap(), InitOutcome::Opened);
    server.request_shutdown().unwrap();
}

#[test]
fn test_shutdown_before_init_does_nothing() {
    let port = free_port().unwrap();
    let server = TcpAdapter::tcp(settings("server", SocketRole::Server, port));
    assert_eq!(server.request_shutdown().unwrap(), ShutdownOutcome::AlreadyDown);
    assert_eq!(server.state(), LinkState::Uninitialized);
}

#[test]
fn test_nothing_available_when_idle() {
    let (server, client) = connected_pair().unwrap();
    for src in [DestSrc::MASTER, DestSrc::SLAVE_1, DestSrc::SLAVE_2] {
        assert!(!server.is_packet_available(src));
        assert!(!client.is_packet_available(src));
        assert_eq!(server.collect(src), None);
    }
}

/// A client whose server went away stays `Ready` but cannot send. A second
/// init is a no-op; shutdown then init reconnects.
#[test]
fn test_client_reconnects_after_shutdown_and_init() {
    let (server, client) = connected_pair().unwrap();
    let port = server.local_addr().expect("server is listening").port();
    assert!(client.handover(&packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 1, &[])));
    collect_within(&*server, DestSrc::SLAVE_2, WAIT).unwrap();
    drop(server);

    let p = packet(DestSrc::SLAVE_2, DestSrc::SLAVE_1, 2, &[]);
    wait_for_condition(WAIT, || !client.handover(&p)).unwrap();

    let restarted = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "restarted",
        SocketRole::Server,
        port,
    ))));
    restarted.request_init().unwrap();

    assert_eq!(client.request_init().unwrap(), InitOutcome::AlreadyReady);
    assert_eq!(client.state(), LinkState::Ready);
    assert!(!client.handover(&p), "connection is not restored by a second init");

    client.request_shutdown().unwrap();
    assert_eq!(client.request_init().unwrap(), InitOutcome::Opened);
    assert!(client.handover(&p));
    let received = collect_within(&*restarted, DestSrc::SLAVE_2, WAIT).unwrap();
    assert_eq!(received.seq_cnt(), 2);
}
