//! Local preprocessing of translation units
//!
//! Each source is expanded with `<compiler> /E` before shipping so the peer
//! never needs the project's headers.

use crate::task::CompilationTask;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors expanding a single source
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Failed to launch {compiler}: {source}")]
    Spawn {
        compiler: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid compiler arguments {args:?}: {reason}")]
    Arguments { args: String, reason: String },

    #[error("Preprocessing {file} exited with {status}: {stderr}")]
    Failed {
        file: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Produces the expanded translation unit for a task
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// `args` is the task's argument string with PCH flags already stripped
    async fn preprocess(&self, task: &CompilationTask, args: &str) -> Result<Vec<u8>, PreprocessError>;
}

/// Runs the task's own compiler with `/E`
#[derive(Debug, Clone, Default)]
pub struct CompilerPreprocessor;

impl CompilerPreprocessor {
    pub fn new() -> Self {
        Self
    }

    fn command(task: &CompilationTask, args: &str) -> Result<Command, PreprocessError> {
        let mut cmd = Command::new(&task.compiler);
        cmd.arg("/E");
        for dir in &task.include_dirs {
            cmd.arg(format!("/I{}", dir.display()));
        }
        push_opaque_args(&mut cmd, args)?;
        cmd.arg(&task.file_path);
        if !task.project_path.as_os_str().is_empty() && task.project_path.is_dir() {
            cmd.current_dir(&task.project_path);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

// MSVC parses its own command line on Windows; pass the string untouched.
#[cfg(windows)]
fn push_opaque_args(cmd: &mut Command, args: &str) -> Result<(), PreprocessError> {
    if !args.trim().is_empty() {
        cmd.raw_arg(args);
    }
    Ok(())
}

#[cfg(not(windows))]
fn push_opaque_args(cmd: &mut Command, args: &str) -> Result<(), PreprocessError> {
    let argv = shell_words::split(args).map_err(|e| PreprocessError::Arguments {
        args: args.to_string(),
        reason: e.to_string(),
    })?;
    cmd.args(argv);
    Ok(())
}

#[async_trait]
impl Preprocessor for CompilerPreprocessor {
    async fn preprocess(&self, task: &CompilationTask, args: &str) -> Result<Vec<u8>, PreprocessError> {
        debug!(file = %task.file_path.display(), compiler = %task.compiler.display(), "Preprocessing");
        let output = Self::command(task, args)?
            .output()
            .await
            .map_err(|source| PreprocessError::Spawn {
                compiler: task.compiler.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(PreprocessError::Failed {
                file: task.file_path.clone(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        // cl echoes the file name and diagnostics on stderr even on success
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            info!(file = %task.file_path.display(), "{}", line);
        }
        Ok(output.stdout)
    }
}
