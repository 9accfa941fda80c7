//! Configuration system for pktroute nodes.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PKTROUTE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pktroute/config.toml
//!   3. ~/.config/pktroute/config.toml

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::packet::{DestSrc, MAX_PACKET_LEN};

/// Top-level configuration.
///
/// Missing tables fall back to empty lists, not to the default topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    #[serde(default)]
    pub in_streams: Vec<InStreamConfig>,
    #[serde(default)]
    pub out_streams: Vec<OutStreamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// This application's routing tag. Packets addressed here are delivered locally.
    pub app_id: DestSrc,
    /// Scheduler tick for the poll loop.
    pub poll_interval_ms: u64,
    /// Largest packet any adapter accepts. Must be below 256.
    pub max_packet_len: usize,
}

/// Which end of the connection an adapter owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketRole {
    Client,
    Server,
}

/// One socket shared by any number of streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    pub role: SocketRole,
    /// Remote host for clients, bind address for servers. Empty = unset.
    #[serde(default)]
    pub host: String,
    /// Must be greater than 2000.
    pub port: u16,
}

/// Collects packets from one source through one adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InStreamConfig {
    pub source: DestSrc,
    pub adapter: String,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

/// Sends packets for one destination through one adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutStreamConfig {
    pub dest: DestSrc,
    pub adapter: String,
}

fn default_queue_size() -> usize {
    10
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// The default layout is a master node connected as a client to the slave-1
/// server, which relays everything slave-2 produces.
impl Default for NodeConfig {
    fn default() -> Self {
        let adapter = "slave-1".to_string();
        Self {
            node: NodeSettings::default(),
            adapters: vec![AdapterConfig {
                name: adapter.clone(),
                role: SocketRole::Client,
                host: "localhost".to_string(),
                port: 9101,
            }],
            in_streams: vec![
                InStreamConfig {
                    source: DestSrc::SLAVE_1,
                    adapter: adapter.clone(),
                    queue_size: default_queue_size(),
                },
                InStreamConfig {
                    source: DestSrc::SLAVE_2,
                    adapter: adapter.clone(),
                    queue_size: default_queue_size(),
                },
            ],
            out_streams: vec![
                OutStreamConfig {
                    dest: DestSrc::SLAVE_1,
                    adapter: adapter.clone(),
                },
                OutStreamConfig {
                    dest: DestSrc::SLAVE_2,
                    adapter,
                },
            ],
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            app_id: DestSrc::MASTER,
            poll_interval_ms: 50,
            max_packet_len: MAX_PACKET_LEN,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("pktroute")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("adapter name '{0}' is used twice")]
    DuplicateAdapter(String),
    #[error("stream for {stream} refers to unknown adapter '{adapter}'")]
    UnknownAdapter { stream: DestSrc, adapter: String },
    #[error("more than one in-stream collects from {0}")]
    DuplicateSource(DestSrc),
    #[error("more than one out-stream sends to {0}")]
    DuplicateDest(DestSrc),
    #[error("in-stream for {0} has a zero-size packet queue")]
    ZeroQueue(DestSrc),
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            NodeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PKTROUTE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&NodeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PKTROUTE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PKTROUTE_NODE__APP_ID") {
            if let Ok(id) = v.parse() {
                self.node.app_id = DestSrc(id);
            }
        }
        if let Ok(v) = std::env::var("PKTROUTE_NODE__POLL_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.node.poll_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("PKTROUTE_NODE__MAX_PACKET_LEN") {
            if let Ok(len) = v.parse() {
                self.node.max_packet_len = len;
            }
        }
    }

    /// Check that streams and adapters refer to each other consistently.
    ///
    /// Socket parameters (port, host, packet length) are not checked here;
    /// each adapter checks its own during initialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        let mut names = HashSet::new();
        for a in &self.adapters {
            if !names.insert(a.name.as_str()) {
                return Err(ConfigError::DuplicateAdapter(a.name.clone()));
            }
        }

        let mut sources = HashSet::new();
        for s in &self.in_streams {
            if !names.contains(s.adapter.as_str()) {
                return Err(ConfigError::UnknownAdapter {
                    stream: s.source,
                    adapter: s.adapter.clone(),
                });
            }
            if !sources.insert(s.source) {
                return Err(ConfigError::DuplicateSource(s.source));
            }
            if s.queue_size == 0 {
                return Err(ConfigError::ZeroQueue(s.source));
            }
        }

        let mut dests = HashSet::new();
        for s in &self.out_streams {
            if !names.contains(s.adapter.as_str()) {
                return Err(ConfigError::UnknownAdapter {
                    stream: s.dest,
                    adapter: s.adapter.clone(),
                });
            }
            if !dests.insert(s.dest) {
                return Err(ConfigError::DuplicateDest(s.dest));
            }
        }

        Ok(())
    }

    pub fn adapter(&self, name: &str) -> Option<&AdapterConfig> {
        self.adapters.iter().find(|a| a.name == name)
    }
}
