//! Classifier result types.

use serde::{Deserialize, Serialize};

/// Classification of a single output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineClass {
    Error,
    Warning,
    Info,
}

/// Aggregated classification of one captured output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputReport {
    /// Lines classified as errors, in output order.
    pub errors: Vec<String>,
    /// Lines classified as warnings, in output order.
    pub warnings: Vec<String>,
}

impl OutputReport {
    /// A report succeeds when no error line was seen.
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another report into this one, keeping order.
    pub fn merge(&mut self, other: OutputReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_succeeds() {
        assert!(OutputReport::default().succeeded());
    }

    #[test]
    fn test_merge() {
        let mut a = OutputReport {
            errors: vec![],
            warnings: vec!["w1".into()],
        };
        a.merge(OutputReport {
            errors: vec!["e1".into()],
            warnings: vec!["w2".into()],
        });
        assert!(!a.succeeded());
        assert_eq!(a.warnings, vec!["w1", "w2"]);
    }
}
