//! pktrouted: packet-routing node daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;

use pktroute_core::config::NodeConfig;
use pktroute_transport::{TcpAdapter, Transport};

mod node;
mod router;
mod stream;

use node::Node;

/// How often traffic counters are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    match NodeConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let config = NodeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NodeConfig::default()
    });
    tracing::info!(
        app_id = %config.node.app_id,
        adapters = config.adapters.len(),
        in_streams = config.in_streams.len(),
        out_streams = config.out_streams.len(),
        "pktrouted starting"
    );

    let mut node = Node::build(&config, |settings| {
        Arc::new(TcpAdapter::tcp(settings)) as Arc<dyn Transport>
    })
    .context("failed to build node")?;
    if let Err(e) = node.init() {
        node.shutdown();
        return Err(e);
    }

    // ── Scheduler ────────────────────────────────────────────────────────────

    let mut poll = tokio::time::interval(Duration::from_millis(config.node.poll_interval_ms));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = tokio::time::interval(STATS_INTERVAL);
    stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = poll.tick() => node.tick(),
            _ = stats.tick() => {
                let s = node.stats();
                let (queued, pending) = node.backlog();
                tracing::info!(
                    app_id = %node.app_id(),
                    received = s.received,
                    delivered = s.delivered,
                    forwarded = s.forwarded,
                    dropped = s.dropped,
                    sent = s.sent,
                    queued,
                    pending,
                    "node stats"
                );
            }
            r = &mut ctrl_c => {
                match r {
                    Ok(()) => tracing::info!("shutdown signal received"),
                    Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
                }
                break;
            }
        }
    }

    node.shutdown();
    Ok(())
}
