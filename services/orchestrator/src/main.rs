//! imgfleet - run image operations across a cluster of container engines.
//!
//! Nodes come from `IMGFLEET_NODES` (or `--node`), the location index lives
//! in the SQLite file named by `IMGFLEET_INDEX_PATH` (or `--index`), and each
//! node is reached over the Docker Engine HTTP API.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use imgfleet_orchestrator::cli::Cli;
use imgfleet_orchestrator::config::Config;
use imgfleet_orchestrator::node::DockerConnector;
use imgfleet_orchestrator::{Cluster, StaticMembership};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    cli.apply_overrides(&mut config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!(
        nodes = config.nodes.len(),
        index_path = ?config.index_path,
        timeout_secs = config.node_timeout.as_secs(),
        "Configuration loaded"
    );

    let cluster = build_cluster(&config)?;
    cli.execute(&cluster, &config).await
}

fn build_cluster(config: &Config) -> Result<Cluster> {
    let index = config.open_index()?;
    let membership = Arc::new(StaticMembership::new(config.nodes.clone()));
    let connector = Arc::new(DockerConnector::new(config.node_timeout)?);

    Ok(Cluster::new(index, membership, connector))
}
