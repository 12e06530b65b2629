//! Peer discovery types.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Information about the hub itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubInfo {
    /// Hub node identifier.
    pub node_id: String,
    /// Hub software version.
    #[serde(default)]
    pub version: String,
    /// Free-form description reported by the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A remote machine known to the hub.
///
/// Peers compare equal by node identifier only; the address may change
/// between listings without the peer becoming a different peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Opaque node identifier.
    pub node_id: String,
    /// Network address (`host:port`).
    pub peer_addr: String,
    /// Optional human-readable node name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

impl PeerInfo {
    pub fn new(node_id: impl Into<String>, peer_addr: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            peer_addr: peer_addr.into(),
            node_name: None,
        }
    }
}

impl PartialEq for PeerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for PeerInfo {}

impl Hash for PeerInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

/// Hardware descriptor of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerHardware {
    /// Number of CPU cores; used as the peer's batch capacity.
    pub core_count: u32,
    /// Total memory in bytes, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Operating system name, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

impl PeerHardware {
    pub fn with_cores(core_count: u32) -> Self {
        Self {
            core_count,
            memory_bytes: None,
            os: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_peer_identity_is_node_id() {
        let a = PeerInfo::new("node-1", "10.0.0.1:61622");
        let b = PeerInfo::new("node-1", "10.0.0.9:61622");
        let c = PeerInfo::new("node-2", "10.0.0.1:61622");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_peer_info_wire_shape() {
        let json = r#"{"nodeId":"0xabc","peerAddr":"10.30.8.5:61622"}"#;
        let peer: PeerInfo = serde_json::from_str(json).unwrap();
        assert_eq!(peer.node_id, "0xabc");
        assert_eq!(peer.peer_addr, "10.30.8.5:61622");
        assert!(peer.node_name.is_none());
    }

    #[test]
    fn test_hardware_optional_fields() {
        let hw: PeerHardware = serde_json::from_str(r#"{"coreCount":8}"#).unwrap();
        assert_eq!(hw, PeerHardware::with_cores(8));

        let json = serde_json::to_value(&hw).unwrap();
        assert!(json.get("memoryBytes").is_none());
    }
}
