//! The routing node: adapters, their poll loops, the streams bound to them
//! and the router between in- and out-streams.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use pktroute_core::config::{NodeConfig, SocketRole};
use pktroute_core::DestSrc;
use pktroute_transport::{AdapterSettings, ChannelPollLoop, PollOutcome, Transport};

use crate::router::{Route, Router};
use crate::stream::{InStream, OutStream, Stream};

/// Upper bound on packets read from one adapter in one tick.
const MAX_POLLS_PER_TICK: usize = 32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub received: u64,
    pub delivered: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub sent: u64,
}

pub struct Node {
    app_id: DestSrc,
    loops: Vec<ChannelPollLoop>,
    in_streams: Vec<Arc<InStream>>,
    out_streams: Vec<Arc<OutStream>>,
    router: Router,
    stats: NodeStats,
}

impl Node {
    /// Wire up adapters and streams. `make_adapter` builds the transport
    /// for each configured adapter.
    pub fn build(
        config: &NodeConfig,
        mut make_adapter: impl FnMut(AdapterSettings) -> Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate().context("invalid node configuration")?;

        let mut index = HashMap::new();
        let mut loops = Vec::with_capacity(config.adapters.len());
        for adapter in &config.adapters {
            let settings = AdapterSettings::from_config(adapter, config.node.max_packet_len);
            index.insert(adapter.name.as_str(), loops.len());
            loops.push(ChannelPollLoop::new(make_adapter(settings)));
        }

        let binding = |name: &str| -> Result<(SocketRole, usize)> {
            let role = config
                .adapter(name)
                .map(|a| a.role)
                .with_context(|| format!("unknown adapter '{name}'"))?;
            let i = index
                .get(name)
                .copied()
                .with_context(|| format!("unknown adapter '{name}'"))?;
            Ok((role, i))
        };

        let mut in_streams = Vec::with_capacity(config.in_streams.len());
        for cfg in &config.in_streams {
            let (role, i) = binding(&cfg.adapter)?;
            let stream = Arc::new(InStream::new(
                cfg.source,
                role,
                loops[i].adapter().clone(),
                cfg.queue_size,
            ));
            loops[i].register(stream.clone());
            in_streams.push(stream);
        }

        let mut router = Router::new(config.node.app_id);
        let mut out_streams = Vec::with_capacity(config.out_streams.len());
        for cfg in &config.out_streams {
            let (role, i) = binding(&cfg.adapter)?;
            let stream = Arc::new(OutStream::new(cfg.dest, role, loops[i].adapter().clone()));
            router.add_out_stream(stream.clone());
            out_streams.push(stream);
        }

        for pl in &loops {
            let name = pl.adapter().name();
            let used = config.in_streams.iter().any(|s| s.adapter == name)
                || config.out_streams.iter().any(|s| s.adapter == name);
            if !used {
                tracing::warn!(adapter = name, "adapter has no streams and will not be opened");
            }
        }

        Ok(Self {
            app_id: config.node.app_id,
            loops,
            in_streams,
            out_streams,
            router,
            stats: NodeStats::default(),
        })
    }

    pub fn app_id(&self) -> DestSrc {
        self.app_id
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Packets waiting in in-stream queues and out-stream backlogs.
    pub fn backlog(&self) -> (usize, usize) {
        let queued = self.in_streams.iter().map(|s| s.queued()).sum();
        let pending = self.out_streams.iter().map(|s| s.pending()).sum();
        (queued, pending)
    }

    fn streams(&self) -> Vec<&dyn Stream> {
        self.in_streams
            .iter()
            .map(|s| s.as_ref() as &dyn Stream)
            .chain(self.out_streams.iter().map(|s| s.as_ref() as &dyn Stream))
            .collect()
    }

    /// Initialize and reset every stream. Server adapters go first so a
    /// client in the same process can connect to them.
    pub fn init(&self) -> Result<()> {
        let mut streams = self.streams();
        streams.sort_by_key(|s| s.role() == SocketRole::Client);
        for stream in streams {
            stream.init().with_context(|| {
                format!(
                    "failed to initialize {} on adapter '{}'",
                    stream.label(),
                    stream.adapter().name()
                )
            })?;
            stream.reset();
        }
        tracing::info!(app_id = %self.app_id, adapters = self.loops.len(), "node initialized");
        Ok(())
    }

    /// Shut every stream down, clients before servers. Failures are logged
    /// and do not stop the remaining shutdowns.
    pub fn shutdown(&self) {
        let mut streams = self.streams();
        streams.sort_by_key(|s| s.role() == SocketRole::Server);
        for stream in streams {
            if let Err(e) = stream.shutdown() {
                tracing::warn!(
                    stream = %stream.label(),
                    adapter = stream.adapter().name(),
                    error = %e,
                    "stream shutdown failed"
                );
            }
        }
        tracing::info!(app_id = %self.app_id, "node shut down");
    }

    /// One scheduler tick: poll, route, flush.
    pub fn tick(&mut self) {
        for pl in &self.loops {
            for _ in 0..MAX_POLLS_PER_TICK {
                if !matches!(pl.run_once(), PollOutcome::Arrived(_)) {
                    break;
                }
            }
        }

        for stream in &self.in_streams {
            for packet in stream.drain() {
                self.stats.received += 1;
                match self.router.route(packet) {
                    Route::Local => self.stats.delivered += 1,
                    Route::Forwarded(_) => self.stats.forwarded += 1,
                    Route::Dropped => self.stats.dropped += 1,
                }
            }
        }

        for stream in &self.out_streams {
            self.stats.sent += stream.flush() as u64;
        }
    }
}
