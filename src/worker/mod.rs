//! Worker proxy
//!
//! A [`Worker`] stands in for one remote peer. It owns the peer's session
//! (created on first dispatch, reused afterwards) and the batch currently
//! assigned to it. [`Worker::dispatch`] never fails: every error is logged and
//! folded into a failed [`BatchOutcome`].

mod outcome;

pub use outcome::BatchOutcome;

use crate::bundle::script::{OUTPUT_ARCHIVE, SCRIPT_NAME, TOOLCHAIN_DIR};
use crate::bundle::{package_batch, BundleError, Preprocessor};
use crate::cache::{CacheError, PackageCache};
use crate::delivery::DeliveryUrls;
use crate::hub::{HubApi, HubError};
use crate::task::CompilationTask;
use golem_classifier::{classify_output, ClassifierConfig};
use golem_protocol::{Command, DeploymentImage, DeploymentSpec, FileFormat, PeerHardware, PeerInfo};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Remote session id, shared so a supervisor can drop a session whose
/// dispatch it abandoned
#[derive(Debug, Clone, Default)]
pub struct SessionSlot(Arc<Mutex<Option<String>>>);

impl SessionSlot {
    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    fn set(&self, id: String) {
        *self.lock() = Some(id);
    }

    /// Take the id out, leaving the slot empty
    pub fn take(&self) -> Option<String> {
        self.lock().take()
    }

    /// Drop the session on the peer, if one is open
    pub async fn end(&self, hub: &dyn HubApi, node_id: &str) -> Result<(), HubError> {
        if let Some(id) = self.take() {
            hub.drop_deployment(node_id, &id).await?;
            info!(node_id = %node_id, deployment_id = %id, "Dropped session");
        }
        Ok(())
    }
}

/// Errors inside a dispatch; folded into [`BatchOutcome`]
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Packaging failed: {0}")]
    Bundle(#[from] BundleError),

    #[error("Toolchain packaging failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Hub request failed: {0}")]
    Hub(#[from] HubError),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("Hub returned {got} results for {expected} commands")]
    MissingOutput { expected: usize, got: usize },
}

/// Everything a dispatch needs besides the worker itself
#[derive(Clone)]
pub struct DispatchContext {
    pub hub: Arc<dyn HubApi>,
    pub cache: Arc<PackageCache>,
    pub urls: DeliveryUrls,
    pub preprocessor: Arc<dyn Preprocessor>,
    pub classifier: ClassifierConfig,
    /// Tag given to sessions created on peers
    pub deployment_name: String,
}

/// Local proxy for one peer
#[derive(Debug)]
pub struct Worker {
    peer: PeerInfo,
    hardware: PeerHardware,
    generation: u64,
    tasks: Vec<CompilationTask>,
    session: SessionSlot,
}

impl Worker {
    pub fn new(peer: PeerInfo, hardware: PeerHardware, generation: u64) -> Self {
        Self {
            peer,
            hardware,
            generation,
            tasks: Vec::new(),
            session: SessionSlot::default(),
        }
    }

    /// Hub node id of the peer
    pub fn node_id(&self) -> &str {
        &self.peer.node_id
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    /// Hardware reported when the worker was created
    pub fn hardware(&self) -> &PeerHardware {
        &self.hardware
    }

    /// Roster generation; a newer worker for the same node supersedes this one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Batch capacity: the peer's core count, at least one
    pub fn capacity(&self) -> usize {
        (self.hardware.core_count as usize).max(1)
    }

    /// Id of the open session, if any
    pub fn deployment_id(&self) -> Option<String> {
        self.session.get()
    }

    /// Handle on the session slot that outlives the worker
    pub fn session(&self) -> SessionSlot {
        self.session.clone()
    }

    /// The batch assigned for the next dispatch
    pub fn tasks(&self) -> &[CompilationTask] {
        &self.tasks
    }

    pub fn add_task(&mut self, task: CompilationTask) {
        self.tasks.push(task);
    }

    /// Empty the batch; the session stays open
    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }

    /// Package, ship and run the current batch
    pub async fn dispatch(&mut self, ctx: &DispatchContext) -> BatchOutcome {
        let files: Vec<PathBuf> = self.tasks.iter().map(|t| t.file_path.clone()).collect();
        match self.run_batch(ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(node_id = %self.peer.node_id, error = %e, "Dispatch failed");
                BatchOutcome::failed(files, e.to_string())
            }
        }
    }

    /// Drop the remote session, if one exists
    pub async fn end_session(&mut self, hub: &dyn HubApi) -> Result<(), HubError> {
        self.session.end(hub, &self.peer.node_id).await
    }

    async fn run_batch(&mut self, ctx: &DispatchContext) -> Result<BatchOutcome, DispatchError> {
        let node_id = self.peer.node_id.clone();
        let batch = package_batch(&self.tasks, ctx.preprocessor.as_ref(), self.capacity()).await?;
        let local_failures: Vec<PathBuf> = batch
            .failures
            .iter()
            .flat_map(|f| f.files.iter().cloned())
            .collect();

        if batch.is_empty() {
            warn!(node_id = %node_id, "No group survived preprocessing, skipping peer");
            return Ok(BatchOutcome::local_only(local_failures));
        }

        let task_hash = ctx.cache.register_task_bundle(batch.tar_bytes);

        let cache = Arc::clone(&ctx.cache);
        let compilers = batch.compilers.clone();
        let toolchain_hash = tokio::task::spawn_blocking(move || cache.toolchain_hash(&compilers))
            .await
            .map_err(|e| DispatchError::Join(e.to_string()))??;

        let deployment_id = self.ensure_session(ctx, &toolchain_hash).await?;

        let task_dir = format!("{}.tar", task_hash);
        let commands = vec![
            Command::download(
                ctx.urls.compiler(&toolchain_hash),
                TOOLCHAIN_DIR,
                FileFormat::TarGz,
            ),
            Command::download(ctx.urls.tasks(&task_hash), task_dir.as_str(), FileFormat::Tar),
            Command::exec(format!("{}/{}", task_dir, SCRIPT_NAME), Vec::new()),
        ];
        let exec_index = commands.len() - 1;

        info!(
            node_id = %node_id,
            task_hash = %task_hash,
            tasks = batch.packaged.len(),
            "Dispatching batch"
        );
        let results = ctx
            .hub
            .update_deployment(&node_id, &deployment_id, &commands)
            .await?;
        let output = results.get(exec_index).ok_or(DispatchError::MissingOutput {
            expected: commands.len(),
            got: results.len(),
        })?;

        let report = classify_output(output, &ctx.classifier);
        for line in &report.errors {
            error!(node_id = %node_id, task_hash = %task_hash, "{}", line);
        }
        for line in &report.warnings {
            warn!(node_id = %node_id, task_hash = %task_hash, "{}", line);
        }

        let mut uploaded = false;
        if report.succeeded() {
            let upload = Command::upload(
                ctx.urls.upload(&task_hash, OUTPUT_ARCHIVE),
                format!("{}/{}", task_dir, OUTPUT_ARCHIVE),
            );
            ctx.hub
                .update_deployment(&node_id, &deployment_id, std::slice::from_ref(&upload))
                .await?;
            uploaded = true;
            info!(node_id = %node_id, task_hash = %task_hash, "Batch compiled, outputs uploaded");
        } else {
            error!(
                node_id = %node_id,
                task_hash = %task_hash,
                errors = report.errors.len(),
                "Batch failed"
            );
        }

        Ok(BatchOutcome {
            task_hash: Some(task_hash),
            remote_succeeded: report.succeeded(),
            packaged: batch.packaged.iter().map(|t| t.file_path.clone()).collect(),
            local_failures,
            report,
            uploaded,
            error: None,
        })
    }

    async fn ensure_session(
        &mut self,
        ctx: &DispatchContext,
        toolchain_hash: &str,
    ) -> Result<String, DispatchError> {
        if let Some(id) = self.session.get() {
            return Ok(id);
        }
        let image = DeploymentImage::sha1(toolchain_hash, ctx.urls.compiler(toolchain_hash));
        let spec = DeploymentSpec::new(image, ctx.deployment_name.as_str());
        let id = ctx.hub.create_deployment(&self.peer.node_id, &spec).await?;
        info!(node_id = %self.peer.node_id, deployment_id = %id, "Created session");
        self.session.set(id.clone());
        Ok(id)
    }
}
