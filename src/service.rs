//! Build service handle
//!
//! Wires the package cache, delivery endpoint and scheduler together. The
//! endpoint is bound before anything else so the port it actually got (the
//! config may ask for port 0) ends up in the URLs handed to peers.

use crate::bundle::{CompilerPreprocessor, Preprocessor};
use crate::cache::PackageCache;
use crate::config::{ConfigError, ServiceConfig};
use crate::delivery::{self, DeliveryError, DeliveryServer, DeliveryUrls};
use crate::hub::HubApi;
use crate::scheduler::{BuildEvent, Scheduler, SchedulerError};
use crate::task::CompilationTask;
use crate::worker::DispatchContext;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Delivery endpoint error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Service was already started")]
    AlreadyStarted,
}

struct Running {
    cancel: CancellationToken,
    server: JoinHandle<Result<(), DeliveryError>>,
}

/// One build service: cache, delivery endpoint and scheduler
pub struct BuildService {
    cache: Arc<PackageCache>,
    urls: DeliveryUrls,
    local_addr: SocketAddr,
    scheduler: Scheduler,
    /// Bound but not yet serving
    server: Mutex<Option<DeliveryServer>>,
    running: Mutex<Option<Running>>,
}

impl BuildService {
    /// Bind the delivery endpoint; preprocess with the real compilers
    pub async fn bind(config: &ServiceConfig, hub: Arc<dyn HubApi>) -> Result<Self, ServiceError> {
        Self::bind_with(config, hub, Arc::new(CompilerPreprocessor::new())).await
    }

    pub async fn bind_with(
        config: &ServiceConfig,
        hub: Arc<dyn HubApi>,
        preprocessor: Arc<dyn Preprocessor>,
    ) -> Result<Self, ServiceError> {
        let host = config.resolve_advertise_host()?;
        let cache = Arc::new(PackageCache::new());

        let router = delivery::router(Arc::clone(&cache), &config.delivery_settings());
        let server = DeliveryServer::bind(config.bind_addr()?, router).await?;
        let local_addr = server.local_addr();
        let urls = DeliveryUrls::new(&host, local_addr.port(), &config.path_prefix);
        info!(addr = %local_addr, base = urls.base(), "Delivery endpoint bound");

        let ctx = DispatchContext {
            hub,
            cache: Arc::clone(&cache),
            urls: urls.clone(),
            preprocessor,
            classifier: config.classifier.clone(),
            deployment_name: config.deployment_name.clone(),
        };
        let scheduler = Scheduler::new(config.scheduler_config(), ctx);

        Ok(Self {
            cache,
            urls,
            local_addr,
            scheduler,
            server: Mutex::new(Some(server)),
            running: Mutex::new(None),
        })
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start serving and scheduling under a child of `parent`.
    ///
    /// A service starts once; after [`stop`](Self::stop) bind a new one.
    pub fn start(&self, parent: &CancellationToken) -> Result<(), ServiceError> {
        let server = self
            .server
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(ServiceError::AlreadyStarted)?;

        let cancel = parent.child_token();
        let handle = server.spawn(cancel.child_token());
        if let Err(e) = self.scheduler.start(&cancel) {
            cancel.cancel();
            return Err(e.into());
        }
        *self.running() = Some(Running {
            cancel,
            server: handle,
        });
        Ok(())
    }

    /// Stop the scheduler, then the endpoint. Idempotent.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        let Some(running) = self.running().take() else {
            return;
        };
        running.cancel.cancel();
        match running.server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Delivery endpoint failed"),
            Err(e) => error!(error = %e, "Delivery endpoint task died"),
        }
    }

    pub fn add_task(&self, task: CompilationTask) {
        self.scheduler.add_task(task);
    }

    /// See [`Scheduler::wait_until_drained`]
    pub async fn wait_until_drained(&self) -> bool {
        self.scheduler.wait_until_drained().await
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending_tasks()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.scheduler.subscribe()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn urls(&self) -> &DeliveryUrls {
        &self.urls
    }

    pub fn cache(&self) -> &Arc<PackageCache> {
        &self.cache
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
