//! TCP endpoints.
//!
//! A TCP stream has no message boundaries, so each read first peeks the
//! packet's length byte and only consumes the packet once all of its bytes
//! are queued in the kernel. A packet that has only partly arrived is
//! reported as "nothing available" and picked up by a later poll.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};

use pktroute_core::packet::{peek_length, HEADER_LEN, MAX_PACKET_LEN};
use pktroute_core::Packet;

use super::Endpoint;
use crate::error::TransportError;

/// Pending connections the server keeps queued while it serves its peer.
const LISTEN_BACKLOG: i32 = 8;

// ── Stream I/O ────────────────────────────────────────────────────────────────

enum StreamRead {
    Packet(Packet),
    Nothing,
    /// Peer closed or reset the connection.
    Closed,
}

enum StreamWrite {
    Written,
    NotWritten,
    /// The connection is gone; further writes cannot succeed.
    Broken,
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}

fn read_packet(stream: &mut TcpStream, max_len: usize) -> StreamRead {
    let mut buf = [0u8; MAX_PACKET_LEN];
    let available = match stream.peek(&mut buf) {
        Ok(0) => return StreamRead::Closed,
        Ok(n) => n,
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
            return StreamRead::Nothing
        }
        Err(e) if is_disconnect(e.kind()) => {
            tracing::debug!(error = %e, "peek failed, connection lost");
            return StreamRead::Closed;
        }
        Err(e) => {
            tracing::warn!(error = %e, "peek failed");
            return StreamRead::Nothing;
        }
    };

    let declared = peek_length(&buf[..available]).unwrap_or(0);
    if declared < HEADER_LEN {
        // No packet boundary to skip to: drop everything queued.
        match stream.read(&mut buf[..available]) {
            Ok(n) => tracing::warn!(declared, discarded = n, "malformed packet length"),
            Err(e) => tracing::warn!(error = %e, declared, "discarding malformed bytes failed"),
        }
        return StreamRead::Nothing;
    }
    if available < declared {
        return StreamRead::Nothing;
    }

    let mut bytes = vec![0u8; declared];
    if let Err(e) = stream.read_exact(&mut bytes) {
        tracing::warn!(error = %e, "read failed after peek");
        return StreamRead::Nothing;
    }
    if declared > max_len {
        // Consumed whole, so the next packet still starts on a boundary.
        tracing::warn!(declared, max_len, "packet longer than limit, discarded");
        return StreamRead::Nothing;
    }

    match Packet::from_bytes(bytes) {
        Ok(packet) => {
            tracing::trace!(
                len = packet.len(),
                bytes = %hex::encode(packet.as_bytes()),
                "packet read"
            );
            StreamRead::Packet(packet)
        }
        Err(e) => {
            tracing::warn!(error = %e, "discarding invalid packet");
            StreamRead::Nothing
        }
    }
}

fn write_packet(stream: &mut TcpStream, packet: &Packet) -> StreamWrite {
    let bytes = packet.as_bytes();
    match stream.write(bytes) {
        Ok(n) if n == bytes.len() => {
            tracing::trace!(len = n, bytes = %hex::encode(bytes), "packet written");
            StreamWrite::Written
        }
        Ok(n) => {
            tracing::warn!(written = n, len = bytes.len(), "short write");
            StreamWrite::NotWritten
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            tracing::debug!("socket not writable");
            StreamWrite::NotWritten
        }
        Err(e) if is_disconnect(e.kind()) => {
            tracing::warn!(error = %e, "write failed, connection lost");
            StreamWrite::Broken
        }
        Err(e) => {
            tracing::warn!(error = %e, "write failed");
            StreamWrite::NotWritten
        }
    }
}

fn shutdown_stream(stream: TcpStream) -> Result<(), TransportError> {
    match stream.shutdown(Shutdown::Both) {
        Ok(()) => Ok(()),
        // Peer already went away; the descriptor is released on drop.
        Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(TransportError::connection("shutdown", e)),
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::connection("resolve", e))?
        .next()
        .ok_or_else(|| {
            TransportError::connection(
                "resolve",
                io::Error::new(ErrorKind::AddrNotAvailable, format!("no address for {host}")),
            )
        })
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Connects to a server socket. The connection is made once, in `open`.
///
/// Once the server closes the connection the stream is dropped and reads
/// and writes fail. The adapter stays `Ready`, so reconnecting takes a
/// shutdown followed by a new initialization.
#[derive(Debug)]
pub struct ClientSocket {
    host: String,
    port: u16,
    max_packet_len: usize,
    stream: Option<TcpStream>,
}

impl ClientSocket {
    pub fn new(host: String, port: u16, max_packet_len: usize) -> Self {
        Self {
            host,
            port,
            max_packet_len,
            stream: None,
        }
    }
}

impl Endpoint for ClientSocket {
    fn open(&mut self) -> Result<(), TransportError> {
        let addr = resolve(&self.host, self.port)?;
        let stream =
            TcpStream::connect(addr).map_err(|e| TransportError::connection("connect", e))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| TransportError::connection("set_nonblocking", e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::connection("TCP_NODELAY", e))?;
        tracing::info!(server = %addr, "client socket connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn read_nonblocking(&mut self) -> Option<Packet> {
        let stream = self.stream.as_mut()?;
        match read_packet(stream, self.max_packet_len) {
            StreamRead::Packet(p) => Some(p),
            StreamRead::Nothing => None,
            StreamRead::Closed => {
                tracing::info!(host = %self.host, port = self.port, "server closed connection");
                self.stream = None;
                None
            }
        }
    }

    fn write_nonblocking(&mut self, packet: &Packet) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            tracing::debug!("write on unconnected client socket");
            return false;
        };
        match write_packet(stream, packet) {
            StreamWrite::Written => true,
            StreamWrite::NotWritten => false,
            StreamWrite::Broken => {
                self.stream = None;
                false
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.take() {
            Some(stream) => shutdown_stream(stream),
            None => Ok(()),
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Listens for one peer at a time.
///
/// `open` only binds and listens, so the paired client can be initialized
/// once the server's initialization has completed. The peer is accepted by
/// the first read or write that finds a pending connection. When the peer
/// disconnects the server goes back to accepting.
#[derive(Debug)]
pub struct ServerSocket {
    host: String,
    port: u16,
    max_packet_len: usize,
    listener: Option<TcpListener>,
    peer: Option<(TcpStream, SocketAddr)>,
}

impl ServerSocket {
    pub fn new(host: String, port: u16, max_packet_len: usize) -> Self {
        Self {
            host,
            port,
            max_packet_len,
            listener: None,
            peer: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept a pending connection if there is no peer yet.
    fn accept_peer(&mut self) -> Option<&mut TcpStream> {
        if self.peer.is_none() {
            let listener = self.listener.as_ref()?;
            match listener.accept() {
                Ok((stream, addr)) => {
                    // Accepted sockets do not inherit O_NONBLOCK.
                    if let Err(e) = stream.set_nonblocking(true) {
                        tracing::warn!(
                            error = %e,
                            peer = %addr,
                            "set_nonblocking on accepted socket failed"
                        );
                        return None;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "TCP_NODELAY on accepted socket failed");
                    }
                    tracing::info!(peer = %addr, "server socket accepted peer");
                    self.peer = Some((stream, addr));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    return None;
                }
            }
        }
        self.peer.as_mut().map(|(stream, _)| stream)
    }

    fn drop_peer(&mut self) {
        if let Some((_, addr)) = self.peer.take() {
            tracing::info!(peer = %addr, "peer disconnected");
        }
    }
}

impl Endpoint for ServerSocket {
    fn open(&mut self) -> Result<(), TransportError> {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        let addr = resolve(host, self.port)?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::connection("socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::connection("SO_REUSEADDR", e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::connection("bind", e))?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TransportError::connection("listen", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::connection("set_nonblocking", e))?;

        tracing::info!(addr = %addr, "server socket listening");
        self.listener = Some(socket.into());
        Ok(())
    }

    fn read_nonblocking(&mut self) -> Option<Packet> {
        let max_len = self.max_packet_len;
        let stream = self.accept_peer()?;
        match read_packet(stream, max_len) {
            StreamRead::Packet(p) => Some(p),
            StreamRead::Nothing => None,
            StreamRead::Closed => {
                self.drop_peer();
                None
            }
        }
    }

    fn write_nonblocking(&mut self, packet: &Packet) -> bool {
        let Some(stream) = self.accept_peer() else {
            tracing::debug!("write with no connected peer");
            return false;
        };
        match write_packet(stream, packet) {
            StreamWrite::Written => true,
            StreamWrite::NotWritten => false,
            StreamWrite::Broken => {
                self.drop_peer();
                false
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let result = match self.peer.take() {
            Some((stream, _)) => shutdown_stream(stream),
            None => Ok(()),
        };
        self.listener = None;
        result
    }
}
