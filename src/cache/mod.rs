//! Content-addressed package cache
//!
//! Holds two kinds of bundles served to peers by the delivery endpoint:
//!
//! - toolchain bundles: gzip-compressed tars of a compiler set, keyed by the
//!   set and by the SHA-1 of the uncompressed tar. They survive [`PackageCache::reset`].
//! - task bundles: packaged batches keyed by the SHA-1 of their bytes,
//!   dropped on reset once a build drains.
//!
//! Bundles are immutable once registered. Concurrent registration of the same
//! content collapses to a single entry.

mod toolchain;

use bytes::Bytes;
use dashmap::DashMap;
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Errors building toolchain bundles
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Compiler set is empty")]
    EmptyCompilerSet,

    #[error("Compiler directory not found for {compiler}")]
    CompilerDirMissing { compiler: PathBuf },

    #[error("No executables or shared libraries found for {compilers:?}")]
    EmptyToolchain { compilers: Vec<PathBuf> },
}

/// Lowercase hex SHA-1 of a byte slice
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Order- and duplicate-independent identity of a compiler set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolchainKey(BTreeSet<PathBuf>);

impl ToolchainKey {
    /// Key for a compiler set; duplicates collapse
    pub fn new<I, P>(compilers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self(compilers.into_iter().map(Into::into).collect())
    }

    /// Compiler paths in sorted order
    pub fn compilers(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A built toolchain bundle
#[derive(Debug, Clone)]
pub struct CompilerPackage {
    pub compilers: Vec<PathBuf>,
    /// SHA-1 of the uncompressed tar
    pub hash: String,
    /// Gzip-compressed tar
    pub data: Bytes,
}

/// Shared cache of toolchain and task bundles
#[derive(Debug, Default)]
pub struct PackageCache {
    toolchain_index: DashMap<ToolchainKey, String>,
    toolchains: DashMap<String, Arc<CompilerPackage>>,
    tasks: DashMap<String, Bytes>,
}

impl PackageCache {
    /// An empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash of the toolchain bundle for a compiler set, building it on a miss.
    ///
    /// Walks the filesystem on a miss; call from a blocking context.
    pub fn toolchain_hash<P: AsRef<Path>>(&self, compilers: &[P]) -> Result<String, CacheError> {
        let key = ToolchainKey::new(compilers.iter().map(|c| c.as_ref().to_path_buf()));
        if key.is_empty() {
            return Err(CacheError::EmptyCompilerSet);
        }

        if let Some(hash) = self.toolchain_index.get(&key) {
            return Ok(hash.clone());
        }

        let tar = toolchain::build_archive(&key)?;
        let hash = content_hash(&tar);
        let data = Bytes::from(toolchain::gzip(&tar)?);
        info!(
            toolchain_hash = %hash,
            tar_bytes = tar.len(),
            gzip_bytes = data.len(),
            "Built toolchain bundle"
        );

        // Package first so anyone who can see the index entry can fetch bytes.
        self.toolchains.entry(hash.clone()).or_insert_with(|| {
            Arc::new(CompilerPackage {
                compilers: key.compilers().map(Path::to_path_buf).collect(),
                hash: hash.clone(),
                data,
            })
        });
        self.toolchain_index.entry(key).or_insert_with(|| hash.clone());
        Ok(hash)
    }

    /// Built toolchain package by hash
    pub fn toolchain(&self, hash: &str) -> Option<Arc<CompilerPackage>> {
        self.toolchains.get(hash).map(|p| Arc::clone(p.value()))
    }

    /// Compressed toolchain bytes by hash, for serving
    pub fn toolchain_bytes(&self, hash: &str) -> Option<Bytes> {
        self.toolchains.get(hash).map(|p| p.data.clone())
    }

    /// Number of distinct toolchains built so far
    pub fn toolchain_count(&self) -> usize {
        self.toolchains.len()
    }

    /// Register a task bundle and return its content hash
    pub fn register_task_bundle(&self, bytes: impl Into<Bytes>) -> String {
        let bytes = bytes.into();
        let hash = content_hash(&bytes);
        debug!(task_hash = %hash, bytes = bytes.len(), "Registered task bundle");
        self.tasks.entry(hash.clone()).or_insert(bytes);
        hash
    }

    /// Task bundle bytes by hash; `None` once the cache was reset
    pub fn task_bundle_bytes(&self, hash: &str) -> Option<Bytes> {
        self.tasks.get(hash).map(|b| b.clone())
    }

    /// Number of task bundles currently held
    pub fn task_bundle_count(&self) -> usize {
        self.tasks.len()
    }

    /// Drop task bundles; toolchains are kept
    pub fn reset(&self) {
        let dropped = self.tasks.len();
        self.tasks.clear();
        debug!(dropped, "Cleared task bundles");
    }
}
