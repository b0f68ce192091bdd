// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service-definition document.
//!
//! The managers consume a JSON document describing services, their per-side
//! PDU sizes, channel IDs, and which node/endpoint each party lives on:
//!
//! ```json
//! {
//!   "pduMetaDataSize": 24,
//!   "endpoints": [
//!     {"nodeId": "server_node", "endpoints": [{"id": "ep1", "config_path": "ep1.json"}]}
//!   ],
//!   "services": [
//!     {
//!       "name": "Service/Add",
//!       "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
//!                   "server": {"baseSize": 160, "heapSize": 0}},
//!       "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
//!       "clients": [
//!         {"name": "TestClient", "requestChannelId": 0, "responseChannelId": 1,
//!          "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! The `endpoints` array may be replaced by an `endpoints_config_path` string
//! naming a sibling JSON file that holds the array; the loader resolves that
//! path relative to the document's own directory.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Default PDU metadata size when `pduMetaDataSize` is absent.
pub const DEFAULT_PDU_META_DATA_SIZE: usize = 24;

/// Configuration failure. Unrecoverable: it fails `initialize`.
#[derive(Debug)]
pub enum ConfigError {
    /// The document (or an endpoints file it references) could not be read.
    FileNotFound(String),
    /// The document is not valid JSON or misses required structure.
    Parse(String),
    /// The document parsed but violates a semantic rule.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound(path) => write!(f, "config file not found: {}", path),
            Self::Parse(msg) => write!(f, "config parse error: {}", msg),
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level service-definition document.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Fixed per-PDU metadata overhead added to every buffer size.
    #[serde(rename = "pduMetaDataSize", default = "default_meta_size")]
    pub pdu_meta_data_size: usize,

    /// Inline endpoints section.
    #[serde(default)]
    pub endpoints: Option<Vec<NodeEndpoints>>,

    /// Alternative to `endpoints`: path of a sibling JSON file holding the array.
    #[serde(default)]
    pub endpoints_config_path: Option<String>,

    /// Declared services.
    pub services: Vec<ServiceDef>,
}

fn default_meta_size() -> usize {
    DEFAULT_PDU_META_DATA_SIZE
}

/// The PDU endpoints available on one node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEndpoints {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub endpoints: Vec<EndpointDef>,
}

/// One PDU endpoint: its ID and the transport's own config file.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDef {
    pub id: String,
    pub config_path: String,
}

/// One service: name, sizing, serving endpoints, permitted clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    pub name: String,

    #[serde(rename = "pduSize")]
    pub pdu_size: PduSizeSpec,

    pub server_endpoints: Vec<EndpointRef>,

    pub clients: Vec<ClientDef>,
}

impl ServiceDef {
    /// Find a client definition by name.
    #[must_use]
    pub fn client(&self, name: &str) -> Option<&ClientDef> {
        self.clients.iter().find(|c| c.name == name)
    }
}

/// Per-side base/heap sizes used by the buffer sizing rule.
#[derive(Debug, Clone, Deserialize)]
pub struct PduSizeSpec {
    pub client: SidePduSize,
    pub server: SidePduSize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidePduSize {
    #[serde(rename = "baseSize")]
    pub base_size: usize,
    #[serde(rename = "heapSize")]
    pub heap_size: usize,
}

/// Reference to a PDU endpoint on a node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointRef {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "endpointId")]
    pub endpoint_id: String,
}

/// One permitted client of a service.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientDef {
    pub name: String,
    #[serde(rename = "requestChannelId")]
    pub request_channel_id: i32,
    #[serde(rename = "responseChannelId")]
    pub response_channel_id: i32,
    pub client_endpoint: EndpointRef,
}

impl ServiceConfig {
    /// Load and parse the document at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_json_str(&text)
    }

    /// Parse a document from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Return the endpoints section, following `endpoints_config_path`
    /// indirection relative to `base_dir` when the inline array is absent.
    pub fn resolve_endpoints(&self, base_dir: &Path) -> Result<Vec<NodeEndpoints>, ConfigError> {
        if let Some(ref inline) = self.endpoints {
            return Ok(inline.clone());
        }
        if let Some(ref rel_path) = self.endpoints_config_path {
            let path = base_dir.join(rel_path);
            let text = fs::read_to_string(&path)
                .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
            return serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()));
        }
        Err(ConfigError::Invalid(
            "missing 'endpoints' or 'endpoints_config_path' section".to_string(),
        ))
    }
}

/// Look up the transport config path for `(node_id, endpoint_id)`.
#[must_use]
pub fn find_endpoint_config<'a>(
    endpoints: &'a [NodeEndpoints],
    node_id: &str,
    endpoint_id: &str,
) -> Option<&'a str> {
    endpoints
        .iter()
        .filter(|n| n.node_id == node_id)
        .flat_map(|n| n.endpoints.iter())
        .find(|e| e.id == endpoint_id)
        .map(|e| e.config_path.as_str())
}
