//! Service configuration
//!
//! Layers, lowest first:
//! 1. Built-in defaults ([`defaults`])
//! 2. User config file (`~/.config/golem-build/config.toml`)
//! 3. CLI flags ([`ConfigOverrides`])

mod address;
pub mod defaults;

pub use address::{detect_local_ip, hub_target};

use crate::delivery::DeliverySettings;
use crate::scheduler::SchedulerConfig;
use defaults::*;
use golem_classifier::ClassifierConfig;
use golem_protocol::DEFAULT_APP_NAME;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("HOME environment variable not set")]
    NoHome,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Could not detect a local address towards the hub: {0}")]
    AddressDetection(#[source] io::Error),
}

/// Everything the build service reads from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub hub_url: String,
    /// Sent as `X-GU-APPNAME: Bearer <app_name>`
    pub app_name: String,
    pub server_port: u16,
    pub bind_address: String,
    /// Host peers use to reach the delivery endpoint; detected when unset
    pub advertise_host: Option<String>,
    pub path_prefix: String,
    pub build_path: PathBuf,
    pub discovery_interval_secs: u64,
    pub dispatch_poll_ms: u64,
    /// 0 = no limit
    pub dispatch_timeout_secs: u64,
    /// 0 = no limit
    pub max_upload_bytes: u64,
    pub deployment_name: String,
    pub classifier: ClassifierConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            advertise_host: None,
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            build_path: PathBuf::from(DEFAULT_BUILD_PATH),
            discovery_interval_secs: DEFAULT_DISCOVERY_INTERVAL_SECS,
            dispatch_poll_ms: DEFAULT_DISPATCH_POLL_MS,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Default config file path (~/.config/golem-build/config.toml)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".config/golem-build/config.toml"))
    }

    /// Load from `path` if given (it must exist), else from the default
    /// path if present, else built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse from TOML; missing keys take built-in defaults
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        hub_target(&self.hub_url)?;

        if self.app_name.trim().is_empty() {
            return Err(invalid("app_name", "must not be empty"));
        }
        self.bind_addr()?;
        if let Some(host) = &self.advertise_host {
            if host.trim().is_empty() || host.contains('/') {
                return Err(invalid("advertise_host", "must be a bare host name or address"));
            }
        }
        if self.path_prefix.contains("..") || self.path_prefix.contains(char::is_whitespace) {
            return Err(invalid("path_prefix", "must be a plain URL path"));
        }
        if self.build_path.as_os_str().is_empty() {
            return Err(invalid("build_path", "must not be empty"));
        }
        if self.discovery_interval_secs == 0 {
            return Err(invalid("discovery_interval_secs", "must be at least 1"));
        }
        if self.dispatch_poll_ms == 0 {
            return Err(invalid("dispatch_poll_ms", "must be at least 1"));
        }
        if self.deployment_name.trim().is_empty() {
            return Err(invalid("deployment_name", "must not be empty"));
        }
        if self.classifier.error_markers.iter().any(|m| m.is_empty())
            || self.classifier.warning_markers.iter().any(|m| m.is_empty())
        {
            return Err(invalid("classifier", "markers must not be empty strings"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| invalid("bind_address", &format!("{:?} is not an IP address", self.bind_address)))?;
        Ok(SocketAddr::new(ip, self.server_port))
    }

    /// Host peers should use, detecting one when not configured
    pub fn resolve_advertise_host(&self) -> Result<String, ConfigError> {
        match &self.advertise_host {
            Some(host) => Ok(host.clone()),
            None => detect_local_ip(&self.hub_url).map(|ip| ip.to_string()),
        }
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        (self.dispatch_timeout_secs > 0).then(|| Duration::from_secs(self.dispatch_timeout_secs))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            discovery_interval: Duration::from_secs(self.discovery_interval_secs),
            poll_interval: Duration::from_millis(self.dispatch_poll_ms),
            dispatch_timeout: self.dispatch_timeout(),
        }
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            path_prefix: self.path_prefix.clone(),
            build_path: self.build_path.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// CLI flags layered over the file config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub hub_url: Option<String>,
    pub server_port: Option<u16>,
    pub build_path: Option<PathBuf>,
    pub advertise_host: Option<String>,
}

impl ConfigOverrides {
    /// Apply set flags and re-validate
    pub fn apply(&self, mut config: ServiceConfig) -> Result<ServiceConfig, ConfigError> {
        if let Some(url) = &self.hub_url {
            config.hub_url = url.clone();
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(path) = &self.build_path {
            config.build_path = path.clone();
        }
        if let Some(host) = &self.advertise_host {
            config.advertise_host = Some(host.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = ServiceConfig::parse("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.server_port, 6000);
        assert_eq!(config.path_prefix, "requestID");
        assert_eq!(config.app_name, "GolemCompiler");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
hub_url = "http://10.30.10.121:6162"
app_name = "NightlyBuild"
server_port = 6100
advertise_host = "192.168.4.2"
build_path = "out/objs"
discovery_interval_secs = 5
dispatch_timeout_secs = 0

[classifier]
error_markers = [": error"]
"#;
        let config = ServiceConfig::parse(toml).unwrap();

        assert_eq!(config.hub_url, "http://10.30.10.121:6162");
        assert_eq!(config.server_port, 6100);
        assert_eq!(config.resolve_advertise_host().unwrap(), "192.168.4.2");
        assert_eq!(config.dispatch_timeout(), None);
        assert_eq!(config.classifier.error_markers, vec![": error"]);
        assert_eq!(config.classifier.warning_markers, vec!["warning"]);
        assert_eq!(
            config.scheduler_config().discovery_interval,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (toml, field) in [
            ("hub_url = \"nope\"", "hub_url"),
            ("bind_address = \"localhost\"", "bind_address"),
            ("discovery_interval_secs = 0", "discovery_interval_secs"),
            ("path_prefix = \"../up\"", "path_prefix"),
            ("advertise_host = \"\"", "advertise_host"),
            ("[classifier]\nerror_markers = [\"\"]", "classifier"),
        ] {
            match ServiceConfig::parse(toml) {
                Err(ConfigError::InvalidValue { field: f, .. }) => assert_eq!(f, field, "{toml}"),
                other => panic!("{toml}: expected invalid {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        assert!(matches!(
            ServiceConfig::parse("server_port = \"six thousand\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(matches!(
            ServiceConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert!(ServiceConfig::load_or_default(Some(&path)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_port = 7000\n").unwrap();

        let config = ServiceConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.server_port, 7000);
    }

    #[test]
    fn test_overrides() {
        let overrides = ConfigOverrides {
            hub_url: Some("http://hub.example:6162".to_string()),
            server_port: Some(0),
            ..ConfigOverrides::default()
        };
        let config = overrides.apply(ServiceConfig::default()).unwrap();

        assert_eq!(config.hub_url, "http://hub.example:6162");
        assert_eq!(config.bind_addr().unwrap().port(), 0);
        assert_eq!(config.build_path, PathBuf::from("build"));
    }

    #[test]
    fn test_override_revalidates() {
        let overrides = ConfigOverrides {
            hub_url: Some("::::".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(overrides.apply(ServiceConfig::default()).is_err());
    }
}
