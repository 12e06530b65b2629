//! Hub control-plane client
//!
//! The scheduler and workers talk to the hub only through [`HubApi`], so tests
//! can swap in [`crate::mock::MockHub`].

mod http;

pub use http::{parse_deployment_id, HttpHub};

use async_trait::async_trait;
use golem_protocol::{Command, DeploymentSpec, HubInfo, PeerHardware, PeerInfo};

/// Hub errors
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hub returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed hub response for {operation}: {reason}")]
    Malformed {
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid hub URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid app name {0:?}")]
    InvalidAppName(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Unknown deployment {deployment_id} on {node_id}")]
    UnknownDeployment {
        node_id: String,
        deployment_id: String,
    },
}

pub type HubResult<T> = Result<T, HubError>;

/// Operations the build service needs from the hub
#[async_trait]
pub trait HubApi: Send + Sync {
    async fn hub_info(&self) -> HubResult<HubInfo>;

    async fn list_peers(&self) -> HubResult<Vec<PeerInfo>>;

    async fn peer_hardware(&self, node_id: &str) -> HubResult<PeerHardware>;

    /// Create a session on a peer; returns its unquoted deployment id
    async fn create_deployment(&self, node_id: &str, spec: &DeploymentSpec) -> HubResult<String>;

    /// Run commands in order; returns one captured output per command
    async fn update_deployment(
        &self,
        node_id: &str,
        deployment_id: &str,
        commands: &[Command],
    ) -> HubResult<Vec<String>>;

    async fn drop_deployment(&self, node_id: &str, deployment_id: &str) -> HubResult<()>;
}
