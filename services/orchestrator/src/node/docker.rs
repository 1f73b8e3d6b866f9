//! Docker Engine HTTP API transport.
//!
//! Talks to one engine over TCP. Streaming endpoints (pull, push, import,
//! build) answer 200 and then report failures inline as `{"error": ...}`
//! progress lines, so the whole body is scanned before a call succeeds.
//!
//! Reference: https://docs.docker.com/engine/api/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use imgfleet_id::{ImageName, NodeAddress};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use super::client::{
    BuildImageOptions, ImportImageOptions, NodeClient, NodeConnector, NodeError,
    PullImageOptions, PushImageOptions, RegistryAuth,
};

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Builds [`DockerNodeClient`]s that share one connection pool.
#[derive(Clone)]
pub struct DockerConnector {
    client: Client,
}

impl DockerConnector {
    /// Create a connector whose requests time out after `timeout`.
    ///
    /// The timeout is the only bound on node tasks left running in the
    /// background by first-completion fan-outs.
    pub fn new(timeout: Duration) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl NodeConnector for DockerConnector {
    fn connect(&self, address: &NodeAddress) -> Result<Arc<dyn NodeClient>, NodeError> {
        let base_url = engine_base_url(address)?;
        Ok(Arc::new(DockerNodeClient {
            client: self.client.clone(),
            base_url,
        }))
    }
}

/// Client for a single Docker Engine endpoint.
pub struct DockerNodeClient {
    client: Client,
    base_url: String,
}

impl DockerNodeClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder, subject: &str) -> Result<(), NodeError> {
        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(NodeError::ImageNotFound(subject.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(NodeError::Api {
                status: status.as_u16(),
                message: engine_message(&body),
            });
        }

        if let Some(message) = stream_error(&body) {
            return Err(NodeError::Engine(message));
        }

        debug!(url = %self.base_url, subject = %subject, "Engine request completed");
        Ok(())
    }
}

#[async_trait]
impl NodeClient for DockerNodeClient {
    async fn pull_image(
        &self,
        opts: &PullImageOptions,
        auth: &RegistryAuth,
    ) -> Result<(), NodeError> {
        let mut query = vec![("fromImage", opts.repository.to_string())];
        if let Some(tag) = &opts.tag {
            query.push(("tag", tag.clone()));
        }

        let request = self
            .client
            .post(self.url("/images/create"))
            .query(&query)
            .header(REGISTRY_AUTH_HEADER, encode_auth(auth)?);
        self.execute(request, opts.repository.as_str()).await
    }

    async fn push_image(
        &self,
        opts: &PushImageOptions,
        auth: &RegistryAuth,
    ) -> Result<(), NodeError> {
        let name = &opts.name;
        let mut query = Vec::new();
        if let Some(tag) = &opts.tag {
            query.push(("tag", tag.clone()));
        }

        let request = self
            .client
            .post(self.url(&format!("/images/{name}/push")))
            .query(&query)
            .header(REGISTRY_AUTH_HEADER, encode_auth(auth)?);
        self.execute(request, name.as_str()).await
    }

    async fn remove_image(&self, name: &ImageName) -> Result<(), NodeError> {
        let request = self.client.delete(self.url(&format!("/images/{name}")));
        self.execute(request, name.as_str()).await
    }

    async fn import_image(&self, opts: &ImportImageOptions) -> Result<(), NodeError> {
        let mut query = vec![
            ("fromSrc", opts.source.clone()),
            ("repo", opts.repository.clone()),
        ];
        if let Some(tag) = &opts.tag {
            query.push(("tag", tag.clone()));
        }

        let request = self.client.post(self.url("/images/create")).query(&query);
        self.execute(request, &opts.repository).await
    }

    async fn build_image(&self, opts: &BuildImageOptions) -> Result<(), NodeError> {
        let mut query = vec![
            ("t", opts.name.to_string()),
            ("remote", opts.remote.clone()),
        ];
        if let Some(dockerfile) = &opts.dockerfile {
            query.push(("dockerfile", dockerfile.clone()));
        }
        if opts.no_cache {
            query.push(("nocache", "true".to_string()));
        }
        if opts.pull {
            query.push(("pull", "true".to_string()));
        }

        let request = self.client.post(self.url("/build")).query(&query);
        self.execute(request, opts.name.as_str()).await
    }
}

/// Normalize a node address into an engine base URL.
///
/// Accepts `http://`, `https://`, Docker-style `tcp://`, and bare
/// `host:port`. Unix sockets are not reachable through this transport.
fn engine_base_url(address: &NodeAddress) -> Result<String, NodeError> {
    let raw = address.as_str();
    let invalid = |message: String| NodeError::InvalidAddress {
        address: raw.to_string(),
        message,
    };

    let candidate = if let Some(rest) = raw.strip_prefix("tcp://") {
        format!("http://{rest}")
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if let Some((scheme, _)) = raw.split_once("://") {
        return Err(invalid(format!("unsupported scheme '{scheme}'")));
    } else {
        format!("http://{raw}")
    };

    let url = reqwest::Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

fn encode_auth(auth: &RegistryAuth) -> Result<String, NodeError> {
    let json = serde_json::to_vec(auth)
        .map_err(|e| NodeError::Transport(format!("failed to encode registry auth: {e}")))?;
    Ok(URL_SAFE.encode(json))
}

/// Extract the engine's `message` field from an error body.
fn engine_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Find the first failure reported inline in a progress stream.
fn stream_error(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok())
        .find_map(|event| {
            event
                .get("error")
                .and_then(|e| e.as_str())
                .or_else(|| {
                    event
                        .get("errorDetail")
                        .and_then(|d| d.get("message"))
                        .and_then(|m| m.as_str())
                })
                .map(str::to_string)
        })
}
