//! Node transport contract.
//!
//! A [`NodeClient`] performs image operations against exactly one execution
//! node. The orchestrator never looks at how; it only classifies the
//! [`NodeError`] that comes back.

use std::sync::Arc;

use async_trait::async_trait;
use imgfleet_id::{ImageName, NodeAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a node transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// The node does not have the image.
    #[error("no such image: {0}")]
    ImageNotFound(String),

    /// The engine rejected the request.
    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The engine accepted the request but reported a failure while
    /// streaming progress.
    #[error("engine reported failure: {0}")]
    Engine(String),

    /// The request never got a response (connect, timeout, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid node address {address}: {message}")]
    InvalidAddress { address: String, message: String },
}

/// Error code used to decide whether a node failure is tolerable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeErrorKind {
    ImageNotFound,
    Api,
    Engine,
    Transport,
    InvalidAddress,
}

impl NodeError {
    pub fn kind(&self) -> NodeErrorKind {
        match self {
            Self::ImageNotFound(_) => NodeErrorKind::ImageNotFound,
            Self::Api { .. } => NodeErrorKind::Api,
            Self::Engine(_) => NodeErrorKind::Engine,
            Self::Transport(_) => NodeErrorKind::Transport,
            Self::InvalidAddress { .. } => NodeErrorKind::InvalidAddress,
        }
    }
}

/// Registry credentials, passed through to the engine untouched.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(
        default,
        rename = "serveraddress",
        skip_serializing_if = "String::is_empty"
    )]
    pub server_address: String,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Options for pulling an image onto a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullImageOptions {
    /// Full reference to pull, registry host included. The engine receives
    /// it verbatim and the location index is keyed on it.
    pub repository: ImageName,
    #[serde(default)]
    pub tag: Option<String>,
}

impl PullImageOptions {
    pub fn new(repository: ImageName) -> Self {
        Self {
            repository,
            tag: None,
        }
    }
}

/// Options for pushing an image from a node to its registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushImageOptions {
    /// Full reference, as recorded in the location index.
    pub name: ImageName,
    #[serde(default)]
    pub tag: Option<String>,
}

impl PushImageOptions {
    pub fn new(name: ImageName) -> Self {
        Self {
            name,
            tag: None,
        }
    }
}

/// Options for importing an image from a tarball URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportImageOptions {
    /// Repository name given to the imported image.
    pub repository: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// URL of the root filesystem tarball.
    pub source: String,
}

/// Options for building an image from a remote build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildImageOptions {
    /// Name (and optional tag) of the resulting image.
    pub name: ImageName,
    /// Git URL or tarball URL of the build context.
    pub remote: String,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub no_cache: bool,
    /// Always attempt to pull a newer version of the base image.
    #[serde(default)]
    pub pull: bool,
}

/// Image operations against one execution node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn pull_image(
        &self,
        opts: &PullImageOptions,
        auth: &RegistryAuth,
    ) -> Result<(), NodeError>;

    async fn push_image(
        &self,
        opts: &PushImageOptions,
        auth: &RegistryAuth,
    ) -> Result<(), NodeError>;

    /// Remove an image. Must fail with [`NodeError::ImageNotFound`] when the
    /// node does not have it.
    async fn remove_image(&self, name: &ImageName) -> Result<(), NodeError>;

    async fn import_image(&self, opts: &ImportImageOptions) -> Result<(), NodeError>;

    async fn build_image(&self, opts: &BuildImageOptions) -> Result<(), NodeError>;
}

/// Turns a node address into a client for that node.
pub trait NodeConnector: Send + Sync {
    fn connect(&self, address: &NodeAddress) -> Result<Arc<dyn NodeClient>, NodeError>;
}
