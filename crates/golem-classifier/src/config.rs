//! Classifier configuration types.

use serde::{Deserialize, Serialize};

/// Substrings that mark a captured output line.
///
/// Matching is plain, case-sensitive substring search. Error markers win over
/// warning markers when a line contains both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// A line containing any of these fails the batch.
    #[serde(default = "default_error_markers")]
    pub error_markers: Vec<String>,

    /// A line containing any of these is reported as a warning.
    #[serde(default = "default_warning_markers")]
    pub warning_markers: Vec<String>,
}

fn default_error_markers() -> Vec<String> {
    vec![" error".to_string(), "fatal error".to_string()]
}

fn default_warning_markers() -> Vec<String> {
    vec!["warning".to_string()]
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            error_markers: default_error_markers(),
            warning_markers: default_warning_markers(),
        }
    }
}
