//! Task bundle packaging
//!
//! Turns a batch of compilation tasks into one canonical tar holding the
//! preprocessed sources and the remote build script:
//!
//! 1. strip precompiled-header flags and group tasks by
//!    (compiler, arguments, include dirs), one remote invocation per group
//! 2. preprocess every source locally; a failure excludes the whole group
//! 3. archive the survivors plus [`script::SCRIPT_NAME`] with canonical headers
//!
//! The bytes are deterministic for a given batch, so re-packaging the same
//! batch yields the same content hash.

pub(crate) mod archive;
pub mod preprocess;
pub mod script;

pub use preprocess::{CompilerPreprocessor, PreprocessError, Preprocessor};
pub use script::{strip_pch_flags, RemoteScript, ScriptGroup};

use crate::task::CompilationTask;
use archive::append_canonical;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::{debug, error};

/// Errors producing a task bundle
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Tasks compiled by a single remote compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileGroup {
    pub compiler: PathBuf,
    /// Arguments with PCH flags stripped
    pub args: String,
    pub include_dirs: Vec<PathBuf>,
    pub tasks: Vec<CompilationTask>,
}

/// A group that never left the local machine
#[derive(Debug, Clone)]
pub struct GroupFailure {
    pub compiler: PathBuf,
    pub files: Vec<PathBuf>,
    pub reason: String,
}

/// Output of [`package_batch`]
#[derive(Debug, Clone, Default)]
pub struct PackagedBatch {
    /// Canonical tar; empty when no group survived preprocessing
    pub tar_bytes: Vec<u8>,
    /// Tasks included in the bundle
    pub packaged: Vec<CompilationTask>,
    /// Distinct compilers of the packaged groups
    pub compilers: Vec<PathBuf>,
    pub failures: Vec<GroupFailure>,
    pub script: String,
}

impl PackagedBatch {
    pub fn is_empty(&self) -> bool {
        self.packaged.is_empty()
    }

    /// Whether a task was excluded by a local failure
    pub fn failed_locally(&self, file: &Path) -> bool {
        self.failures.iter().any(|f| f.files.iter().any(|p| p == file))
    }
}

/// Group tasks by identical (compiler, stripped args, include dirs).
///
/// Groups keep first-appearance order and tasks keep queue order.
pub fn group_tasks(tasks: &[CompilationTask]) -> Vec<CompileGroup> {
    let mut groups: Vec<CompileGroup> = Vec::new();
    for task in tasks {
        let args = strip_pch_flags(&task.compiler_args);
        match groups.iter_mut().find(|g| {
            g.compiler == task.compiler && g.args == args && g.include_dirs == task.include_dirs
        }) {
            Some(group) => group.tasks.push(task.clone()),
            None => groups.push(CompileGroup {
                compiler: task.compiler.clone(),
                args,
                include_dirs: task.include_dirs.clone(),
                tasks: vec![task.clone()],
            }),
        }
    }
    groups
}

/// Allocates unique, case-insensitive archive names for sources.
///
/// Colliding base names get a `~N` suffix before the extension.
#[derive(Debug, Default)]
struct ArchiveNames {
    taken: HashSet<String>,
}

impl ArchiveNames {
    fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_ascii_lowercase());
    }

    fn allocate(&mut self, file_name: &str) -> String {
        if self.taken.insert(file_name.to_ascii_lowercase()) {
            return file_name.to_string();
        }
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };
        let mut n = 1;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{}~{}.{}", stem, n, ext),
                None => format!("{}~{}", stem, n),
            };
            if self.taken.insert(candidate.to_ascii_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Package a batch into a task bundle.
///
/// `parallelism` becomes the `/MP` value of every remote compiler invocation.
pub async fn package_batch(
    tasks: &[CompilationTask],
    preprocessor: &dyn Preprocessor,
    parallelism: usize,
) -> Result<PackagedBatch, BundleError> {
    let mut batch = PackagedBatch::default();
    let mut names = ArchiveNames::default();
    names.reserve(script::SCRIPT_NAME);
    names.reserve(script::OUTPUT_DIR);

    let mut sources: Vec<(String, Vec<u8>)> = Vec::new();
    let mut remote = RemoteScript::new(parallelism);

    'groups: for group in group_tasks(tasks) {
        let mut expanded = Vec::with_capacity(group.tasks.len());
        for task in &group.tasks {
            match preprocessor.preprocess(task, &group.args).await {
                Ok(bytes) => expanded.push((task.file_name(), bytes)),
                Err(e) => {
                    error!(
                        file = %task.file_path.display(),
                        compiler = %group.compiler.display(),
                        error = %e,
                        "Preprocessing failed, dropping group"
                    );
                    batch.failures.push(GroupFailure {
                        compiler: group.compiler.clone(),
                        files: group.tasks.iter().map(|t| t.file_path.clone()).collect(),
                        reason: e.to_string(),
                    });
                    continue 'groups;
                }
            }
        }

        let mut files = Vec::with_capacity(expanded.len());
        for (file_name, bytes) in expanded {
            let name = names.allocate(&file_name);
            files.push(name.clone());
            sources.push((name, bytes));
        }

        let compiler_name = group
            .compiler
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| group.compiler.to_string_lossy().into_owned());
        remote.add_group(ScriptGroup {
            compiler_name,
            args: group.args.clone(),
            files,
        });

        if !batch.compilers.contains(&group.compiler) {
            batch.compilers.push(group.compiler.clone());
        }
        batch.packaged.extend(group.tasks);
    }

    if batch.packaged.is_empty() {
        return Ok(batch);
    }

    batch.script = remote.render();
    let mut builder = Builder::new(Vec::new());
    for (name, bytes) in &sources {
        append_canonical(&mut builder, Path::new(name), bytes, false)?;
    }
    append_canonical(
        &mut builder,
        Path::new(script::SCRIPT_NAME),
        batch.script.as_bytes(),
        true,
    )?;
    batch.tar_bytes = builder.into_inner()?;

    debug!(
        tasks = batch.packaged.len(),
        groups = remote.groups().len(),
        bytes = batch.tar_bytes.len(),
        "Packaged batch"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::{Cursor, Read};
    use tar::Archive;

    /// Echoes the file path; fails for files whose name starts with "bad"
    struct EchoPreprocessor;

    #[async_trait]
    impl Preprocessor for EchoPreprocessor {
        async fn preprocess(&self, task: &CompilationTask, args: &str) -> Result<Vec<u8>, PreprocessError> {
            if task.file_name().starts_with("bad") {
                return Err(PreprocessError::Failed {
                    file: task.file_path.clone(),
                    status: "exit status: 2".to_string(),
                    stderr: "fatal error C1083".to_string(),
                });
            }
            Ok(format!("// {} [{}]\n", task.file_path.display(), args).into_bytes())
        }
    }

    fn read_entries(tar_bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = Archive::new(Cursor::new(tar_bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                let mut content = String::new();
                e.read_to_string(&mut content).unwrap();
                (path, content)
            })
            .collect()
    }

    #[test]
    fn test_group_tasks_by_compiler_args_and_includes() {
        let tasks = vec![
            CompilationTask::new("a.cpp", "cl.exe", r#"/c /Yu"pch.h""#),
            CompilationTask::new("b.cpp", "cl.exe", "/c"),
            CompilationTask::new("c.cpp", "cl.exe", "/c").with_include_dirs(["inc"]),
            CompilationTask::new("d.cpp", "clang-cl.exe", "/c"),
            CompilationTask::new("e.cpp", "cl.exe", r#"/c /Fp"x.pch""#),
        ];
        let groups = group_tasks(&tasks);

        assert_eq!(groups.len(), 3);
        let files: Vec<Vec<String>> = groups
            .iter()
            .map(|g| g.tasks.iter().map(|t| t.file_name()).collect())
            .collect();
        assert_eq!(files[0], vec!["a.cpp", "b.cpp", "e.cpp"]);
        assert_eq!(files[1], vec!["c.cpp"]);
        assert_eq!(files[2], vec!["d.cpp"]);
        assert_eq!(groups[0].args, "/c");
    }

    #[test]
    fn test_archive_names_disambiguate() {
        let mut names = ArchiveNames::default();
        names.reserve("golembuild.bat");
        assert_eq!(names.allocate("util.cpp"), "util.cpp");
        assert_eq!(names.allocate("UTIL.cpp"), "UTIL~1.cpp");
        assert_eq!(names.allocate("util.cpp"), "util~2.cpp");
        assert_eq!(names.allocate("Makefile"), "Makefile");
        assert_eq!(names.allocate("Makefile"), "Makefile~1");
        assert_eq!(names.allocate("golembuild.bat"), "golembuild~1.bat");
    }

    #[tokio::test]
    async fn test_package_batch_contents() {
        let tasks = vec![
            CompilationTask::new("src/a/util.cpp", "/vc/bin/cl.exe", "/c"),
            CompilationTask::new("src/b/util.cpp", "/vc/bin/cl.exe", "/c"),
        ];
        let batch = package_batch(&tasks, &EchoPreprocessor, 8).await.unwrap();

        assert_eq!(batch.packaged.len(), 2);
        assert_eq!(batch.compilers, vec![PathBuf::from("/vc/bin/cl.exe")]);
        let entries = read_entries(&batch.tar_bytes);
        let names: Vec<&str> = entries.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(names, vec!["util.cpp", "util~1.cpp", "golembuild.bat"]);
        assert_eq!(entries[1].1, "// src/b/util.cpp [/c]\n");
        assert!(entries[2].1.contains(r#"/MP8 "util.cpp" "util~1.cpp""#));
    }

    #[tokio::test]
    async fn test_package_batch_deterministic() {
        let tasks = vec![
            CompilationTask::new("a.cpp", "cl.exe", "/c"),
            CompilationTask::new("b.cpp", "cl.exe", "/c /O2"),
        ];
        let first = package_batch(&tasks, &EchoPreprocessor, 2).await.unwrap();
        let second = package_batch(&tasks, &EchoPreprocessor, 2).await.unwrap();
        assert_eq!(first.tar_bytes, second.tar_bytes);
    }

    #[tokio::test]
    async fn test_failed_group_excluded() {
        let tasks = vec![
            CompilationTask::new("good.cpp", "cl.exe", "/c"),
            CompilationTask::new("bad.cpp", "cl.exe", "/c /O2"),
            CompilationTask::new("also_in_bad_group.cpp", "cl.exe", "/c /O2"),
        ];
        let batch = package_batch(&tasks, &EchoPreprocessor, 2).await.unwrap();

        assert_eq!(batch.packaged.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].files.len(), 2);
        assert!(batch.failed_locally(Path::new("also_in_bad_group.cpp")));
        assert!(!batch.failed_locally(Path::new("good.cpp")));
        assert!(!batch.script.contains("also_in_bad_group"));
    }

    #[tokio::test]
    async fn test_all_groups_failed_yields_empty_batch() {
        let tasks = vec![CompilationTask::new("bad.cpp", "cl.exe", "/c")];
        let batch = package_batch(&tasks, &EchoPreprocessor, 2).await.unwrap();

        assert!(batch.is_empty());
        assert!(batch.tar_bytes.is_empty());
        assert!(batch.compilers.is_empty());
    }
}
