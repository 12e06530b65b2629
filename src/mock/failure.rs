//! Failure injection for the mock hub

use std::collections::HashMap;
use std::time::Duration;

/// Hub operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubOperation {
    HubInfo,
    ListPeers,
    PeerHardware,
    CreateDeployment,
    UpdateDeployment,
    DropDeployment,
}

/// Failure configuration for an operation
#[derive(Debug, Clone, Default)]
pub struct FailureConfig {
    /// Error message to return (if any)
    pub message: Option<String>,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
    /// Panic instead of returning, simulating a crashed dispatch
    pub panic: bool,
}

impl FailureConfig {
    /// Return a connection error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Only add delay
    pub fn delay(duration: Duration) -> Self {
        Self {
            delay: Some(duration),
            ..Self::default()
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            panic: true,
            ..Self::default()
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Per-operation failure injector
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<HubOperation, FailureConfig>,
    call_counts: HashMap<HubOperation, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, op: HubOperation, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    pub fn clear_op(&mut self, op: HubOperation) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Failure to apply to this call, if any
    pub fn check(&mut self, op: HubOperation) -> Option<&FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;
        match config.fail_count {
            Some(limit) if *count > limit => None,
            _ => Some(config),
        }
    }
}
