//! Channel poll loop: routes adapter arrivals to the stream that owns them.
//!
//! The loop itself never blocks and never collects on a consumer's behalf:
//! it reads at most one packet per call and tells the consumer bound to
//! that packet's source that something is waiting. The consumer collects
//! through the adapter when it is ready to.

use std::collections::HashMap;
use std::sync::Arc;

use pktroute_core::DestSrc;

use crate::adapter::{PollOutcome, Transport};

/// Receives "packet available" notifications for one source.
pub trait PacketConsumer: Send + Sync {
    /// The source this consumer collects from.
    fn source(&self) -> DestSrc;

    /// A packet from [`source`](Self::source) is buffered in the adapter.
    fn packet_available(&self);
}

pub struct ChannelPollLoop {
    adapter: Arc<dyn Transport>,
    consumers: HashMap<DestSrc, Arc<dyn PacketConsumer>>,
}

impl ChannelPollLoop {
    pub fn new(adapter: Arc<dyn Transport>) -> Self {
        Self {
            adapter,
            consumers: HashMap::new(),
        }
    }

    /// Bind a consumer to its source. A later registration for the same
    /// source replaces the earlier one.
    pub fn register(&mut self, consumer: Arc<dyn PacketConsumer>) {
        let src = consumer.source();
        if self.consumers.insert(src, consumer).is_some() {
            tracing::warn!(adapter = self.adapter.name(), %src, "replaced consumer");
        }
    }

    pub fn adapter(&self) -> &Arc<dyn Transport> {
        &self.adapter
    }

    /// One scheduler tick.
    ///
    /// A packet whose source has no consumer would block the adapter
    /// forever, so it is collected and dropped here.
    pub fn run_once(&self) -> PollOutcome {
        let outcome = self.adapter.poll();
        let src = match outcome {
            PollOutcome::Idle => return outcome,
            PollOutcome::Arrived(src) | PollOutcome::Pending(src) => src,
        };

        match self.consumers.get(&src) {
            Some(consumer) => consumer.packet_available(),
            None => {
                if let Some(packet) = self.adapter.collect(src) {
                    tracing::warn!(
                        adapter = self.adapter.name(),
                        %src,
                        dest = %packet.dest(),
                        "no stream for packet source, dropped"
                    );
                }
            }
        }
        outcome
    }
}
