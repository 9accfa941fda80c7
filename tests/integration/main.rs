//! pktroute integration test harness.
//!
//! Tests here run adapters over real TCP sockets on the loopback
//! interface. Each test allocates its own port, so tests can run in
//! parallel without interfering with each other.
//!
//!   cargo test --test integration

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use pktroute_core::config::SocketRole;
use pktroute_core::packet::MAX_PACKET_LEN;
use pktroute_core::{DestSrc, Packet, PacketFields, PacketKind};
use pktroute_transport::{AdapterSettings, TcpAdapter, Transport};

mod lifecycle;
mod scenarios;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const LOOPBACK: &str = "127.0.0.1";

/// How long a test waits for loopback traffic before giving up.
pub const WAIT: Duration = Duration::from_secs(5);

/// A port nobody is listening on right now. Bind-to-0 probe; the port is
/// released before it is returned.
pub fn free_port() -> Result<u16> {
    let probe = TcpListener::bind((LOOPBACK, 0)).context("failed to bind port probe")?;
    Ok(probe.local_addr()?.port())
}

pub fn settings(name: &str, role: SocketRole, port: u16) -> AdapterSettings {
    AdapterSettings {
        name: name.to_string(),
        role,
        host: LOOPBACK.to_string(),
        port,
        max_packet_len: MAX_PACKET_LEN,
    }
}

/// Shuts the adapter down when dropped, even if the test panics.
pub struct AdapterGuard(pub Arc<TcpAdapter>);

impl Drop for AdapterGuard {
    fn drop(&mut self) {
        let _ = self.0.request_shutdown();
    }
}

impl std::ops::Deref for AdapterGuard {
    type Target = TcpAdapter;

    fn deref(&self) -> &TcpAdapter {
        &self.0
    }
}

/// A connected server/client adapter pair on a fresh port. The server is
/// initialized first.
pub fn connected_pair() -> Result<(AdapterGuard, AdapterGuard)> {
    let port = free_port()?;
    let server = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "server",
        SocketRole::Server,
        port,
    ))));
    server.request_init().context("server init")?;
    let client = AdapterGuard(Arc::new(TcpAdapter::tcp(settings(
        "client",
        SocketRole::Client,
        port,
    ))));
    client.request_init().context("client init")?;
    Ok((server, client))
}

pub fn packet(src: DestSrc, dest: DestSrc, seq_cnt: u16, params: &[u8]) -> Packet {
    Packet::build(
        PacketFields {
            src,
            dest,
            kind: PacketKind::Report,
            service_type: 3,
            service_subtype: 25,
            seq_cnt,
        },
        params,
    )
    .expect("test packet must fit")
}

/// Poll `adapter` on behalf of `src` until a packet is collected.
pub fn collect_within(adapter: &dyn Transport, src: DestSrc, timeout: Duration) -> Result<Packet> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if adapter.is_packet_available(src) {
            return adapter
                .collect(src)
                .context("available packet could not be collected");
        }
        thread::sleep(Duration::from_millis(1));
    }
    bail!("no packet from {src} within {timeout:?}")
}

/// Generic polling helper. Calls `poll_fn` every 10ms until it returns
/// `true` or `timeout` expires.
pub fn wait_for_condition<F>(timeout: Duration, mut poll_fn: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if poll_fn() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
    bail!("condition not met within {timeout:?}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_free_port_is_bindable() {
    let port = free_port().unwrap();
    assert!(port > 0);
    TcpListener::bind((LOOPBACK, port)).expect("probed port should be free");
}
