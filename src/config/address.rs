//! Advertised host detection
//!
//! Peers need an address of this machine they can reach. Without an explicit
//! `advertise_host` we ask the OS which local address routes to the hub.
//! Connecting a UDP socket sends nothing.

use super::ConfigError;
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Host and port the hub URL points at
pub fn hub_target(hub_url: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "hub_url",
        reason,
    };
    let url = Url::parse(hub_url).map_err(|e| invalid(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid(format!("{} has no host", hub_url)))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid(format!("{} has no port", hub_url)))?;
    Ok((host, port))
}

/// Local address the OS would use to reach the hub
pub fn detect_local_ip(hub_url: &str) -> Result<IpAddr, ConfigError> {
    let (host, port) = hub_target(hub_url)?;
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(ConfigError::AddressDetection)?;
    socket
        .connect((host.as_str(), port))
        .map_err(ConfigError::AddressDetection)?;
    Ok(socket.local_addr().map_err(ConfigError::AddressDetection)?.ip())
}
