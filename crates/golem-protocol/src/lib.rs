//! Golem Hub Protocol Types
//!
//! Defines the JSON shapes exchanged with the hub control plane: peer
//! discovery, peer hardware, and deployment (remote session) management.

pub mod deployment;
pub mod peer;

pub use deployment::{Command, DeploymentImage, DeploymentSpec, EnvType, FileFormat};
pub use peer::{HubInfo, PeerHardware, PeerInfo};

/// Digest prefix the hub expects on image hashes and the delivery endpoint
/// puts on `ETag` values.
pub const SHA1_PREFIX: &str = "SHA1:";

/// Header carrying the application name on every hub request.
pub const APP_NAME_HEADER: &str = "X-GU-APPNAME";

/// Application name announced to the hub when none is configured.
pub const DEFAULT_APP_NAME: &str = "GolemCompiler";

/// Format a content hash the way the hub and peers compare it.
pub fn prefixed_hash(hash: &str) -> String {
    format!("{}{}", SHA1_PREFIX, hash)
}
