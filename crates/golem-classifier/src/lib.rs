//! Heuristic classifier for captured compiler output.
//!
//! Remote compiles always exit 0, so pass/fail is decided from the text the
//! compiler printed. A line is an error when it contains one of the
//! configured error markers, a warning when it contains a warning marker, and
//! informational otherwise.
//!
//! This is substring matching and nothing more. A path or identifier that
//! happens to contain `" error"` will fail a batch; callers must treat the
//! verdict as a heuristic.

mod config;
mod result;

pub use config::ClassifierConfig;
pub use result::{LineClass, OutputReport};

/// Classify one line of output.
pub fn classify_line(line: &str, config: &ClassifierConfig) -> LineClass {
    if config.error_markers.iter().any(|m| line.contains(m.as_str())) {
        LineClass::Error
    } else if config.warning_markers.iter().any(|m| line.contains(m.as_str())) {
        LineClass::Warning
    } else {
        LineClass::Info
    }
}

/// Classify a whole captured stream.
///
/// Accepts `\n`, `\r\n` and bare `\r` line endings. Blank lines are ignored.
pub fn classify_output(output: &str, config: &ClassifierConfig) -> OutputReport {
    let mut report = OutputReport::default();

    for line in output.split(['\n', '\r']) {
        if line.trim().is_empty() {
            continue;
        }
        match classify_line(line, config) {
            LineClass::Error => report.errors.push(line.to_string()),
            LineClass::Warning => report.warnings.push(line.to_string()),
            LineClass::Info => {}
        }
    }

    report
}
