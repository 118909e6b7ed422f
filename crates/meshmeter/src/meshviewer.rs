//! Meshviewer node list client.
//!
//! Freifunk map servers publish a `meshviewer.json` document listing every
//! known node. Only the online flag and the client count are read.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Errors from fetching the node list.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("invalid node list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One mesh node as seen by the map server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Node {
    /// Missing or non-boolean values count as offline
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_online: bool,
    /// Missing, negative or non-integer values count as zero
    #[serde(default, deserialize_with = "lenient_count")]
    pub clients: u64,
}

impl Node {
    pub fn online(clients: u64) -> Self {
        Self {
            is_online: true,
            clients,
        }
    }

    pub fn offline(clients: u64) -> Self {
        Self {
            is_online: false,
            clients,
        }
    }
}

/// Top-level shape of `meshviewer.json`.
#[derive(Debug, Deserialize)]
struct NodeList {
    nodes: Vec<Node>,
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or(false))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_u64().unwrap_or(0))
}

/// Parse a `meshviewer.json` body into nodes.
pub fn parse_nodes(body: &str) -> Result<Vec<Node>, FetchError> {
    let list: NodeList = serde_json::from_str(body)?;
    Ok(list.nodes)
}

/// Source of the current mesh node list.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Node>, FetchError>;
}

/// HTTP client for a Meshviewer node list.
#[derive(Debug, Clone)]
pub struct MeshviewerClient {
    client: reqwest::Client,
    url: String,
}

impl MeshviewerClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl NodeSource for MeshviewerClient {
    async fn fetch(&self) -> Result<Vec<Node>, FetchError> {
        log::debug!("Fetching node list from {}", self.url);
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().await?;
        let nodes = parse_nodes(&body)?;
        log::info!("Fetched {} nodes from {}", nodes.len(), self.url);
        Ok(nodes)
    }
}
