//! Toolchain archive construction

use super::{CacheError, ToolchainKey};
use crate::bundle::archive::{append_canonical, is_executable};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

const LIBRARY_EXTENSIONS: &[&str] = &["exe", "dll", "so", "dylib"];

/// Build the uncompressed toolchain tar for a compiler set.
///
/// Each compiler's directory is walked recursively and every executable or
/// shared library is stored relative to that directory. When two compilers
/// share a relative path the first (in sorted compiler order) wins, so the
/// result is a pure function of the set.
pub(crate) fn build_archive(key: &ToolchainKey) -> Result<Vec<u8>, CacheError> {
    let mut entries: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for compiler in key.compilers() {
        let dir = compiler_dir(compiler);
        if !dir.is_dir() {
            return Err(CacheError::CompilerDirMissing {
                compiler: compiler.to_path_buf(),
            });
        }

        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_toolchain_file(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(dir) else {
                continue;
            };
            entries
                .entry(rel.to_path_buf())
                .or_insert_with(|| entry.path().to_path_buf());
        }
    }

    if entries.is_empty() {
        return Err(CacheError::EmptyToolchain {
            compilers: key.compilers().map(Path::to_path_buf).collect(),
        });
    }

    let mut builder = Builder::new(Vec::new());
    for (rel, full) in &entries {
        let data = fs::read(full)?;
        append_canonical(&mut builder, rel, &data, is_executable(full))?;
    }
    Ok(builder.into_inner()?)
}

pub(crate) fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn compiler_dir(compiler: &Path) -> &Path {
    match compiler.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Executables and shared libraries, including versioned `.so.N` names
pub(crate) fn is_toolchain_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase()) else {
        return false;
    };

    let extension = name.rsplit_once('.').map(|(_, ext)| ext);
    if extension.is_some_and(|ext| LIBRARY_EXTENSIONS.contains(&ext)) {
        return true;
    }

    if let Some((_, version)) = name.split_once(".so.") {
        if !version.is_empty() && version.split('.').all(|p| p.chars().all(|c| c.is_ascii_digit())) {
            return true;
        }
    }

    is_executable(path)
}
