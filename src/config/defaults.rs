//! Built-in defaults
//!
//! Hardcoded values used for every key missing from the config file.

/// Local hub daemon REST endpoint
pub const DEFAULT_HUB_URL: &str = "http://127.0.0.1:6162";

/// Delivery endpoint port
pub const DEFAULT_SERVER_PORT: u16 = 6000;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Path prefix of every delivery route
pub const DEFAULT_PATH_PREFIX: &str = "requestID";

/// Where uploaded result archives are stored and extracted
pub const DEFAULT_BUILD_PATH: &str = "build";

pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 10;

pub const DEFAULT_DISPATCH_POLL_MS: u64 = 1000;

/// 30 minutes; 0 disables the limit
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 1800;

/// 1 GiB; 0 disables the limit
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1 << 30;

/// Tag given to sessions created on peers
pub const DEFAULT_DEPLOYMENT_NAME: &str = "compiler";
