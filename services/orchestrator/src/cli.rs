//! The `imgfleet` command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use imgfleet_id::{ImageName, NodeAddress};

use crate::cluster::Cluster;
use crate::config::Config;
use crate::fanout::CompletionPolicy;
use crate::node::{
    BuildImageOptions, ImportImageOptions, PullImageOptions, PushImageOptions, RegistryAuth,
};

/// Run container-image operations across a cluster of engines.
#[derive(Debug, Parser)]
#[command(name = "imgfleet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Node address; repeat to register several. Overrides IMGFLEET_NODES.
    #[arg(long = "node", global = true)]
    pub nodes: Vec<NodeAddress>,

    /// SQLite file for the location index. Overrides IMGFLEET_INDEX_PATH.
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pull an image onto the given nodes (default: every registered node).
    Pull {
        /// Full image reference, registry host included.
        repository: ImageName,
        #[arg(long)]
        tag: Option<String>,
        /// Target node; repeat for several.
        #[arg(long = "on")]
        targets: Vec<NodeAddress>,
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Push an image from a node that holds it.
    Push {
        name: ImageName,
        #[arg(long)]
        tag: Option<String>,
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Remove an image from every node holding it.
    Remove {
        name: ImageName,
        /// Report the outcome of every node instead of only the first.
        #[arg(long)]
        wait: bool,
    },

    /// Import an image from a tarball URL.
    Import {
        source: String,
        #[arg(long)]
        repository: String,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Build an image from a remote context on the first registered node.
    Build {
        name: ImageName,
        /// Git or tarball URL of the build context.
        #[arg(long)]
        remote: String,
        #[arg(long)]
        dockerfile: Option<String>,
        #[arg(long)]
        no_cache: bool,
        #[arg(long)]
        pull: bool,
    },

    /// Show which nodes hold an image.
    Holders { name: ImageName },

    /// List every image in the location index.
    Images,
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[arg(long, env = "IMGFLEET_REGISTRY_USERNAME")]
    username: Option<String>,
    #[arg(long, env = "IMGFLEET_REGISTRY_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, env = "IMGFLEET_REGISTRY_SERVER")]
    server: Option<String>,
}

impl From<AuthArgs> for RegistryAuth {
    fn from(args: AuthArgs) -> Self {
        Self {
            username: args.username.unwrap_or_default(),
            password: args.password.unwrap_or_default(),
            email: String::new(),
            server_address: args.server.unwrap_or_default(),
        }
    }
}

impl Cli {
    /// Apply the global flags on top of environment configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if !self.nodes.is_empty() {
            config.nodes = self.nodes.clone();
        }
        if let Some(index) = &self.index {
            config.index_path = Some(index.clone());
        }
    }

    /// Run the subcommand against `cluster`.
    ///
    /// Returns only once every node task the command started has finished,
    /// including those a first-completion operation left in the background,
    /// so the caller may drop its runtime right after.
    pub async fn execute(self, cluster: &Cluster, config: &Config) -> Result<()> {
        let result = run(self.command, cluster, config).await;
        cluster.wait_for_background().await;
        result
    }
}

async fn run(command: Commands, cluster: &Cluster, config: &Config) -> Result<()> {
    match command {
        Commands::Pull {
            repository,
            tag,
            targets,
            auth,
        } => {
            let targets = if targets.is_empty() {
                config.nodes.clone()
            } else {
                targets
            };
            let opts = PullImageOptions { repository, tag };
            cluster.pull_image(opts, auth.into(), &targets).await?;
        }
        Commands::Push { name, tag, auth } => {
            let opts = PushImageOptions { name, tag };
            cluster.push_image(opts, auth.into()).await?;
        }
        Commands::Remove { name, wait } => {
            cluster
                .remove_image(&name, CompletionPolicy::from_wait_for_all(wait))
                .await?;
        }
        Commands::Import {
            source,
            repository,
            tag,
        } => {
            let opts = ImportImageOptions {
                repository,
                tag,
                source,
            };
            cluster.import_image(opts).await?;
        }
        Commands::Build {
            name,
            remote,
            dockerfile,
            no_cache,
            pull,
        } => {
            let opts = BuildImageOptions {
                name,
                remote,
                dockerfile,
                no_cache,
                pull,
            };
            cluster.build_image(opts).await?;
        }
        Commands::Holders { name } => {
            for holder in cluster.holders(&name).await? {
                println!("{holder}");
            }
        }
        Commands::Images => {
            for image in cluster.images().await? {
                println!("{image}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_defaults_to_first_completion() {
        let cli = Cli::try_parse_from(["imgfleet", "remove", "busybox"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove { wait: false, .. }));

        let cli = Cli::try_parse_from(["imgfleet", "remove", "busybox", "--wait"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove { wait: true, .. }));
    }

    #[test]
    fn test_global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "imgfleet",
            "images",
            "--node",
            "http://10.0.0.1:2375",
            "--node",
            "http://10.0.0.2:2375",
            "--index",
            "/var/lib/imgfleet/index.db",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.nodes.len(), 2);
        assert_eq!(
            config.index_path,
            Some(PathBuf::from("/var/lib/imgfleet/index.db"))
        );
    }
}
