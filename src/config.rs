//! Orchestrator configuration

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A STUN or TURN server address handed through to the connection engine.
///
/// The orchestrator never talks to these servers itself; it only carries
/// their addresses into the engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs, e.g. `stun:stun.l.google.com:19302`
    pub urls: Vec<String>,
    /// Optional TURN username
    #[serde(default)]
    pub username: String,
    /// Optional TURN credential
    #[serde(default)]
    pub credential: String,
}

impl IceServer {
    /// Create a credential-less (STUN) server entry
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    /// Create a TURN server entry with credentials
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: username.into(),
            credential: credential.into(),
        }
    }
}

/// Configuration for a mesh orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Identifier announced to other participants. Must be unique within
    /// the signaling channel; defaults to a random v4 UUID.
    #[serde(default = "default_local_id")]
    pub local_id: String,

    /// ICE servers passed to the connection engine
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,

    /// Label for the eagerly-created outbound data channel
    #[serde(default = "default_channel_label")]
    pub data_channel_label: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            local_id: default_local_id(),
            ice_servers: default_ice_servers(),
            data_channel_label: default_channel_label(),
        }
    }
}

impl MeshConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local peer identifier
    pub fn with_local_id(mut self, id: impl Into<String>) -> Self {
        self.local_id = id.into();
        self
    }

    /// Add an ICE server
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Set the outbound data channel label
    pub fn with_data_channel_label(mut self, label: impl Into<String>) -> Self {
        self.data_channel_label = label.into();
        self
    }
}

fn default_local_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::stun("stun:stun.l.google.com:19302")]
}

fn default_channel_label() -> String {
    "data".to_string()
}
