//! The socket transport adapter.
//!
//! One adapter owns one [`Endpoint`] and one [`ReadBuffer`]. Streams share
//! it through an `Arc` and call it serially from the scheduler; the mutex
//! only makes the handle `Sync`, it is never held across an await point.
//!
//! Reading is demand driven. The socket is read only when the buffer is
//! empty, so at most one packet is ever in flight. A packet for another
//! source stays buffered until its own stream collects it; meanwhile every
//! other stream sees "not available" and the next packet stays queued in
//! the socket.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use pktroute_core::config::{AdapterConfig, SocketRole};
use pktroute_core::packet::{HEADER_LEN, MAX_PACKET_LEN};
use pktroute_core::{DestSrc, Packet};

use crate::endpoint::{Endpoint, SocketEndpoint};
use crate::error::TransportError;
use crate::lifecycle::{InitOutcome, Lifecycle, LinkState, ShutdownOutcome};
use crate::read_buffer::ReadBuffer;

/// Ports at or below this value are rejected.
pub const MIN_PORT: u16 = 2000;

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub name: String,
    pub role: SocketRole,
    pub host: String,
    pub port: u16,
    pub max_packet_len: usize,
}

impl AdapterSettings {
    pub fn from_config(config: &AdapterConfig, max_packet_len: usize) -> Self {
        Self {
            name: config.name.clone(),
            role: config.role,
            host: config.host.clone(),
            port: config.port,
            max_packet_len,
        }
    }

    /// Initialization check. Never silently defaults a bad parameter.
    pub fn check(&self) -> Result<(), TransportError> {
        if self.max_packet_len > MAX_PACKET_LEN {
            return Err(TransportError::Configuration(format!(
                "maximum packet length {} must be smaller than 256",
                self.max_packet_len
            )));
        }
        if self.max_packet_len < HEADER_LEN {
            return Err(TransportError::Configuration(format!(
                "maximum packet length {} cannot hold the {HEADER_LEN}-byte header",
                self.max_packet_len
            )));
        }
        if self.port <= MIN_PORT {
            return Err(TransportError::Configuration(format!(
                "port {} must be greater than {MIN_PORT}",
                self.port
            )));
        }
        if self.role == SocketRole::Client && self.host.trim().is_empty() {
            return Err(TransportError::Configuration(
                "client socket has no server host".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Transport capability ─────────────────────────────────────────────────────

/// Result of one scheduler poll of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing buffered and nothing waiting on the socket.
    Idle,
    /// A packet from this source was just read and buffered.
    Arrived(DestSrc),
    /// A packet from this source is still waiting to be collected.
    /// The socket was not read.
    Pending(DestSrc),
}

/// What streams need from the adapter they are bound to.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    fn init_check(&self) -> Result<(), TransportError>;

    /// Open the shared socket unless another stream already did.
    fn request_init(&self) -> Result<InitOutcome, TransportError>;

    /// Reset: clear the read buffer. Ungated; every call resets.
    fn request_config(&self);

    /// Close the shared socket unless another stream already did.
    fn request_shutdown(&self) -> Result<ShutdownOutcome, TransportError>;

    /// Packet-available check for the stream collecting from `src`.
    fn is_packet_available(&self, src: DestSrc) -> bool;

    /// Take the buffered packet if it came from `src`.
    fn collect(&self, src: DestSrc) -> Option<Packet>;

    /// Non-blocking send. `false` means "not sent, try again later".
    fn handover(&self, packet: &Packet) -> bool;

    /// Scheduler entry point: read if the buffer is empty and report
    /// whose packet, if any, is buffered.
    fn poll(&self) -> PollOutcome;
}

// ── Adapter ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Inner<E> {
    lifecycle: Lifecycle,
    endpoint: E,
    buffer: ReadBuffer,
}

#[derive(Debug)]
pub struct SocketAdapter<E> {
    settings: AdapterSettings,
    inner: Mutex<Inner<E>>,
}

/// The adapter the daemon builds from configuration.
pub type TcpAdapter = SocketAdapter<SocketEndpoint>;

impl<E: Endpoint> SocketAdapter<E> {
    pub fn new(settings: AdapterSettings, endpoint: E) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::new(),
                endpoint,
                buffer: ReadBuffer::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        // Only a contract violation in ReadBuffer can poison the lock.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    pub fn state(&self) -> LinkState {
        self.lock().lifecycle.state()
    }

    /// Source of the buffered packet, `None` when the buffer is empty.
    pub fn buffered_source(&self) -> Option<DestSrc> {
        self.lock().buffer.peek_source()
    }

    pub fn with_endpoint<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.lock().endpoint)
    }
}

impl TcpAdapter {
    pub fn tcp(settings: AdapterSettings) -> Self {
        let endpoint = SocketEndpoint::for_settings(&settings);
        Self::new(settings, endpoint)
    }

    /// Listening address of a server adapter once it is initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.with_endpoint(|e| match e {
            SocketEndpoint::Server(s) => s.local_addr(),
            SocketEndpoint::Client(_) => None,
        })
    }
}

impl<E: Endpoint> Transport for SocketAdapter<E> {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn init_check(&self) -> Result<(), TransportError> {
        self.settings.check()
    }

    fn request_init(&self) -> Result<InitOutcome, TransportError> {
        let settings = &self.settings;
        let mut guard = self.lock();
        let Inner {
            lifecycle,
            endpoint,
            buffer,
        } = &mut *guard;

        let result = lifecycle.request_init(|| -> Result<(), TransportError> {
            settings.check()?;
            endpoint.open()?;
            buffer.clear();
            Ok(())
        });

        match &result {
            Ok(InitOutcome::Opened) => tracing::info!(
                adapter = %settings.name,
                role = ?settings.role,
                port = settings.port,
                "socket initialized"
            ),
            Ok(InitOutcome::AlreadyReady) => {
                tracing::debug!(adapter = %settings.name, "socket already initialized")
            }
            Err(e) => tracing::warn!(
                adapter = %settings.name,
                error = %e,
                "socket initialization failed"
            ),
        }
        result
    }

    fn request_config(&self) {
        self.lock().buffer.clear();
        tracing::debug!(adapter = %self.settings.name, "read buffer cleared");
    }

    fn request_shutdown(&self) -> Result<ShutdownOutcome, TransportError> {
        let mut guard = self.lock();
        let Inner {
            lifecycle,
            endpoint,
            buffer,
        } = &mut *guard;

        let result = lifecycle.request_shutdown(|| {
            buffer.clear();
            endpoint.close()
        });

        match &result {
            Ok(ShutdownOutcome::Closed) => {
                tracing::info!(adapter = %self.settings.name, "socket shut down")
            }
            Ok(ShutdownOutcome::AlreadyDown) => {
                tracing::debug!(adapter = %self.settings.name, "socket already shut down")
            }
            Err(e) => {
                tracing::warn!(adapter = %self.settings.name, error = %e, "socket close failed")
            }
        }
        result
    }

    fn is_packet_available(&self, src: DestSrc) -> bool {
        let mut inner = self.lock();
        if !inner.lifecycle.is_ready() {
            return false;
        }
        if let Some(buffered) = inner.buffer.peek_source() {
            return buffered == src;
        }
        match inner.endpoint.read_nonblocking() {
            Some(packet) => {
                let from = packet.src();
                tracing::debug!(
                    adapter = %self.settings.name,
                    src = %from,
                    dest = %packet.dest(),
                    len = packet.len(),
                    "packet buffered"
                );
                inner.buffer.store(packet);
                from == src
            }
            None => false,
        }
    }

    fn collect(&self, src: DestSrc) -> Option<Packet> {
        let mut inner = self.lock();
        if inner.buffer.peek_source() != Some(src) {
            return None;
        }
        Some(inner.buffer.take())
    }

    fn handover(&self, packet: &Packet) -> bool {
        let mut inner = self.lock();
        if !inner.lifecycle.is_ready() {
            tracing::debug!(
                adapter = %self.settings.name,
                "hand-over on a socket that is not ready"
            );
            return false;
        }
        let sent = inner.endpoint.write_nonblocking(packet);
        if sent {
            tracing::debug!(
                adapter = %self.settings.name,
                src = %packet.src(),
                dest = %packet.dest(),
                len = packet.len(),
                "packet handed over"
            );
        }
        sent
    }

    fn poll(&self) -> PollOutcome {
        let mut inner = self.lock();
        if !inner.lifecycle.is_ready() {
            return PollOutcome::Idle;
        }
        if let Some(pending) = inner.buffer.peek_source() {
            return PollOutcome::Pending(pending);
        }
        match inner.endpoint.read_nonblocking() {
            Some(packet) => {
                let from = packet.src();
                tracing::debug!(
                    adapter = %self.settings.name,
                    src = %from,
                    dest = %packet.dest(),
                    len = packet.len(),
                    "packet buffered"
                );
                inner.buffer.store(packet);
                PollOutcome::Arrived(from)
            }
            None => PollOutcome::Idle,
        }
    }
}
