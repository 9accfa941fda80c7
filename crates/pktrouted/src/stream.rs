//! In- and out-streams: the per-source and per-destination users of an adapter.
//!
//! Every stream runs its own init, reset and shutdown against the adapter it
//! is bound to. The adapter collapses them so the socket opens and closes
//! once no matter how many streams share it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use pktroute_core::config::SocketRole;
use pktroute_core::{DestSrc, Packet};
use pktroute_transport::{InitOutcome, PacketConsumer, ShutdownOutcome, Transport, TransportError};

/// Failed hand-overs kept for retry before new packets are refused.
pub const PENDING_LIMIT: usize = 64;

/// Lifecycle shared by both stream directions.
pub trait Stream {
    fn label(&self) -> String;

    fn role(&self) -> SocketRole;

    fn adapter(&self) -> &Arc<dyn Transport>;

    fn init(&self) -> Result<InitOutcome, TransportError> {
        self.adapter().init_check()?;
        self.adapter().request_init()
    }

    fn reset(&self) {
        self.adapter().request_config();
    }

    fn shutdown(&self) -> Result<ShutdownOutcome, TransportError> {
        self.adapter().request_shutdown()
    }
}

fn lock(queue: &Mutex<VecDeque<Packet>>) -> MutexGuard<'_, VecDeque<Packet>> {
    queue.lock().unwrap_or_else(|p| p.into_inner())
}

// ── In-stream ────────────────────────────────────────────────────────────────

pub struct InStream {
    source: DestSrc,
    role: SocketRole,
    adapter: Arc<dyn Transport>,
    capacity: usize,
    queue: Mutex<VecDeque<Packet>>,
}

impl InStream {
    pub fn new(
        source: DestSrc,
        role: SocketRole,
        adapter: Arc<dyn Transport>,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            role,
            adapter,
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Take every packet collected since the last drain, oldest first.
    pub fn drain(&self) -> Vec<Packet> {
        lock(&self.queue).drain(..).collect()
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl Stream for InStream {
    fn label(&self) -> String {
        format!("in:{}", self.source)
    }

    fn role(&self) -> SocketRole {
        self.role
    }

    fn adapter(&self) -> &Arc<dyn Transport> {
        &self.adapter
    }

    fn reset(&self) {
        self.adapter.request_config();
        lock(&self.queue).clear();
    }
}

impl PacketConsumer for InStream {
    fn source(&self) -> DestSrc {
        self.source
    }

    /// Collect every consecutive packet from our source. A full queue drops
    /// the packet rather than leaving it to block the shared adapter.
    fn packet_available(&self) {
        while self.adapter.is_packet_available(self.source) {
            let Some(packet) = self.adapter.collect(self.source) else {
                break;
            };
            let mut queue = lock(&self.queue);
            if queue.len() >= self.capacity {
                tracing::warn!(
                    adapter = self.adapter.name(),
                    src = %self.source,
                    seq_cnt = packet.seq_cnt(),
                    capacity = self.capacity,
                    "in-stream queue full, packet dropped"
                );
                continue;
            }
            queue.push_back(packet);
        }
    }
}

// ── Out-stream ───────────────────────────────────────────────────────────────

pub struct OutStream {
    dest: DestSrc,
    role: SocketRole,
    adapter: Arc<dyn Transport>,
    pending: Mutex<VecDeque<Packet>>,
}

impl OutStream {
    pub fn new(dest: DestSrc, role: SocketRole, adapter: Arc<dyn Transport>) -> Self {
        Self {
            dest,
            role,
            adapter,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn dest(&self) -> DestSrc {
        self.dest
    }

    /// Queue a packet for the next flush. Returns `false` if the pending
    /// queue is full and the packet was dropped.
    pub fn submit(&self, packet: Packet) -> bool {
        let mut pending = lock(&self.pending);
        if pending.len() >= PENDING_LIMIT {
            tracing::warn!(
                adapter = self.adapter.name(),
                dest = %self.dest,
                seq_cnt = packet.seq_cnt(),
                "out-stream backlog full, packet dropped"
            );
            return false;
        }
        pending.push_back(packet);
        true
    }

    /// Hand over pending packets in order until the adapter refuses one.
    /// The refused packet stays at the head of the queue.
    pub fn flush(&self) -> usize {
        let mut pending = lock(&self.pending);
        let mut sent = 0;
        while let Some(packet) = pending.front() {
            if !self.adapter.handover(packet) {
                tracing::trace!(
                    adapter = self.adapter.name(),
                    dest = %self.dest,
                    backlog = pending.len(),
                    "hand-over refused, retrying next tick"
                );
                break;
            }
            pending.pop_front();
            sent += 1;
        }
        sent
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Stream for OutStream {
    fn label(&self) -> String {
        format!("out:{}", self.dest)
    }

    fn role(&self) -> SocketRole {
        self.role
    }

    fn adapter(&self) -> &Arc<dyn Transport> {
        &self.adapter
    }
}
