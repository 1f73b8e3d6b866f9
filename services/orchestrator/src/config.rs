//! Configuration for the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use imgfleet_id::NodeAddress;
use imgfleet_index::{InMemoryLocationIndex, LocationIndex, SqliteLocationIndex};
use tracing::warn;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Registered node addresses, in selection order.
    pub nodes: Vec<NodeAddress>,

    /// SQLite file backing the location index. `None` keeps it in memory.
    pub index_path: Option<PathBuf>,

    /// Per-request timeout of the node transport.
    pub node_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index_path: None,
            node_timeout: Duration::from_secs(300),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let nodes = match lookup("IMGFLEET_NODES") {
            Some(raw) => parse_node_list(&raw).context("invalid IMGFLEET_NODES")?,
            None => defaults.nodes,
        };

        let index_path = lookup("IMGFLEET_INDEX_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let node_timeout = match lookup("IMGFLEET_NODE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("invalid IMGFLEET_NODE_TIMEOUT_SECS: {raw}"))?,
            ),
            None => defaults.node_timeout,
        };

        let log_level = lookup("IMGFLEET_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            nodes,
            index_path,
            node_timeout,
            log_level,
        })
    }
}

impl Config {
    /// Open the configured location index.
    ///
    /// Without `index_path` the index is in memory, so every process starts
    /// with no records.
    pub fn open_index(&self) -> Result<Arc<dyn LocationIndex>> {
        match &self.index_path {
            Some(path) => {
                let index = SqliteLocationIndex::open(path)
                    .with_context(|| format!("failed to open index at {}", path.display()))?;
                Ok(Arc::new(index))
            }
            None => {
                warn!("IMGFLEET_INDEX_PATH not set, location index is not persisted");
                Ok(Arc::new(InMemoryLocationIndex::new()))
            }
        }
    }
}

/// Parse a comma-separated node list, skipping blank entries.
pub fn parse_node_list(raw: &str) -> Result<Vec<NodeAddress>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| NodeAddress::parse(s).map_err(Into::into))
        .collect()
}
