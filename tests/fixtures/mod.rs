//! Shared fixtures for integration tests
//!
//! - a scratch toolchain directory with a fake compiler and runtime DLL
//! - a preprocessor that never launches a compiler
//! - dispatch contexts and fast scheduler timings wired to a [`MockHub`]

#![allow(dead_code)]

use async_trait::async_trait;
use golem_build::bundle::{PreprocessError, Preprocessor};
use golem_build::mock::MockHub;
use golem_build::{CompilationTask, DeliveryUrls, DispatchContext, PackageCache, SchedulerConfig};
use golem_classifier::ClassifierConfig;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Expands a task to one declaration; files named `bad*` fail
pub struct StubPreprocessor;

#[async_trait]
impl Preprocessor for StubPreprocessor {
    async fn preprocess(&self, task: &CompilationTask, _args: &str) -> Result<Vec<u8>, PreprocessError> {
        if task.file_name().starts_with("bad") {
            return Err(PreprocessError::Failed {
                file: task.file_path.clone(),
                status: "exit status: 2".to_string(),
                stderr: "fatal error C1083: Cannot open include file".to_string(),
            });
        }
        Ok(format!("int {};\n", task.file_name().replace('.', "_")).into_bytes())
    }
}

/// Scratch directory with `toolchain/bin/cl.exe` and a source dir
pub struct Workspace {
    pub dir: TempDir,
    pub compiler: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("toolchain/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("cl.exe"), b"MZ cl").unwrap();
        fs::write(bin.join("c1xx.dll"), b"MZ c1xx").unwrap();
        fs::write(bin.join("readme.txt"), b"not shipped").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let compiler = bin.join("cl.exe");
        Self { dir, compiler }
    }

    pub fn task(&self, name: &str) -> CompilationTask {
        let file = self.dir.path().join("src").join(name);
        fs::write(&file, format!("int {};\n", name.replace('.', "_"))).unwrap();
        CompilationTask::new(file, &self.compiler, "/c /nologo /EHsc").with_project_path(self.dir.path())
    }

    pub fn tasks(&self, count: usize) -> Vec<CompilationTask> {
        (0..count).map(|i| self.task(&format!("unit{}.cpp", i))).collect()
    }

    pub fn build_path(&self) -> PathBuf {
        self.dir.path().join("build")
    }
}

pub fn context(hub: Arc<MockHub>) -> DispatchContext {
    DispatchContext {
        hub,
        cache: Arc::new(PackageCache::new()),
        urls: DeliveryUrls::new("127.0.0.1", 6000, "requestID"),
        preprocessor: Arc::new(StubPreprocessor),
        classifier: ClassifierConfig::default(),
        deployment_name: "compiler".to_string(),
    }
}

/// Timings short enough for tests
pub fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        discovery_interval: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
        dispatch_timeout: None,
    }
}

/// Poll `check` until it holds or `limit` elapses
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
