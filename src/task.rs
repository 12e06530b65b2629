//! Compilation units handed to the build service
//!
//! Tasks are produced by an external project parser and arrive either through
//! the library API or as a JSON array on disk (`golem-build build --tasks`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Errors loading a task list
#[derive(Debug, thiserror::Error)]
pub enum TaskListError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid task list {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One translation unit to compile remotely
///
/// Immutable once created; the worker regroups tasks but never edits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationTask {
    /// Source file to compile
    pub file_path: PathBuf,
    /// Compiler executable; its directory forms the toolchain bundle
    pub compiler: PathBuf,
    /// Opaque compiler argument string
    #[serde(default)]
    pub compiler_args: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precompiled_header: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdb: Option<PathBuf>,
    /// Root of the owning project
    #[serde(default)]
    pub project_path: PathBuf,
    /// Include directories, in search order
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    /// Headers discovered for this unit
    #[serde(default)]
    pub includes: Vec<PathBuf>,
}

impl CompilationTask {
    pub fn new(
        file_path: impl Into<PathBuf>,
        compiler: impl Into<PathBuf>,
        compiler_args: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            compiler: compiler.into(),
            compiler_args: compiler_args.into(),
            precompiled_header: None,
            pdb: None,
            project_path: PathBuf::new(),
            include_dirs: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn with_include_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = path.into();
        self
    }

    pub fn with_precompiled_header(mut self, path: impl Into<PathBuf>) -> Self {
        self.precompiled_header = Some(path.into());
        self
    }

    pub fn with_pdb(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdb = Some(path.into());
        self
    }

    /// Base name of the source file, lossily converted
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.to_string_lossy().into_owned())
    }

    /// Load a JSON array of tasks
    pub fn load_list(path: &Path) -> Result<Vec<Self>, TaskListError> {
        let content = fs::read_to_string(path).map_err(|source| TaskListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| TaskListError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
