//! Result of one dispatch

use golem_classifier::OutputReport;
use std::path::{Path, PathBuf};

/// What happened to a batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Hash of the shipped task bundle; `None` if nothing reached the peer
    pub task_hash: Option<String>,
    /// No error line in the remote output
    pub remote_succeeded: bool,
    /// Sources shipped to the peer
    pub packaged: Vec<PathBuf>,
    /// Sources whose group failed preprocessing
    pub local_failures: Vec<PathBuf>,
    pub report: OutputReport,
    /// Output archive upload was issued
    pub uploaded: bool,
    /// Transport or packaging error that aborted the dispatch
    pub error: Option<String>,
}

impl BatchOutcome {
    /// Whole batch lost to an error
    pub fn failed(files: Vec<PathBuf>, error: String) -> Self {
        Self {
            packaged: files,
            error: Some(error),
            ..Self::default()
        }
    }

    /// Nothing survived preprocessing, the peer was never contacted
    pub fn local_only(local_failures: Vec<PathBuf>) -> Self {
        Self {
            local_failures,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.remote_succeeded && self.local_failures.is_empty()
    }

    /// Remote output has no per-file granularity: an error line fails every
    /// shipped file.
    pub fn task_succeeded(&self, file: &Path) -> bool {
        self.error.is_none() && self.remote_succeeded && !self.local_failures.iter().any(|f| f == file)
    }
}
