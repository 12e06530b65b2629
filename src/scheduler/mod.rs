//! Build scheduler
//!
//! Owns the FIFO task queue and the worker pool and runs two loops:
//!
//! - discovery: polls the hub for peers on a fixed interval, creates a worker
//!   for every new peer and forgets peers that left
//! - dispatch: while tasks are queued, claims an idle worker, hands it up to
//!   `capacity` tasks and spawns a supervised dispatch
//!
//! Each dispatch runs in its own task under a supervisor that awaits it and
//! then, exactly once, returns the worker to the pool (or retires it after a
//! panic or timeout), publishes task events and decrements the in-flight
//! counter. Drain is "queue empty and nothing in flight".

mod events;
mod pool;

pub use events::{BuildEvent, BuildTaskStatus};

use crate::task::CompilationTask;
use crate::worker::{BatchOutcome, DispatchContext, SessionSlot, Worker};
use crossbeam::queue::SegQueue;
use pool::WorkerPool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,
}

/// Loop timing and dispatch limits
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub discovery_interval: Duration,
    /// Dispatch loop wake-up when nothing signals it
    pub poll_interval: Duration,
    /// Abandon a dispatch after this long; `None` waits forever
    pub dispatch_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            dispatch_timeout: None,
        }
    }
}

struct Shared {
    config: SchedulerConfig,
    ctx: DispatchContext,
    queue: SegQueue<CompilationTask>,
    pool: WorkerPool,
    /// Workers mid-dispatch
    in_flight: AtomicUsize,
    /// Tasks held by those workers
    in_flight_tasks: AtomicUsize,
    failed: AtomicBool,
    /// Dispatch loop wake-up: new task, new worker or returned worker
    wake: Notify,
    /// Drain waiters: a dispatch completed
    idle: Notify,
    events: broadcast::Sender<BuildEvent>,
}

struct Running {
    cancel: CancellationToken,
    discovery: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

/// Queue, pool and loops of one build service
pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, ctx: DispatchContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                ctx,
                queue: SegQueue::new(),
                pool: WorkerPool::new(),
                in_flight: AtomicUsize::new(0),
                in_flight_tasks: AtomicUsize::new(0),
                failed: AtomicBool::new(false),
                wake: Notify::new(),
                idle: Notify::new(),
                events,
            }),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Launch both loops under a child of `parent`
    pub fn start(&self, parent: &CancellationToken) -> Result<(), SchedulerError> {
        let mut running = self.running();
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let cancel = parent.child_token();
        let discovery = tokio::spawn(Arc::clone(&self.shared).discovery_loop(cancel.child_token()));
        let dispatch = tokio::spawn(Arc::clone(&self.shared).dispatch_loop(cancel.child_token()));
        *running = Some(Running {
            cancel,
            discovery,
            dispatch,
        });
        info!(
            discovery_secs = self.shared.config.discovery_interval.as_secs_f64(),
            poll_ms = self.shared.config.poll_interval.as_millis() as u64,
            "Scheduler started"
        );
        Ok(())
    }

    /// Cancel both loops and wait for them; in-flight dispatches keep running.
    ///
    /// Idle workers are retired and their sessions dropped. Idempotent.
    pub async fn stop(&self) {
        let Some(running) = self.running().take() else {
            return;
        };
        running.cancel.cancel();
        for (name, handle) in [("discovery", running.discovery), ("dispatch", running.dispatch)] {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Scheduler loop ended abnormally");
            }
        }

        for mut worker in self.shared.pool.retire_idle() {
            if let Err(e) = worker.end_session(self.shared.ctx.hub.as_ref()).await {
                warn!(node_id = worker.node_id(), error = %e, "Failed to drop session");
            }
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Append a task; callable from any thread
    pub fn add_task(&self, task: CompilationTask) {
        self.shared
            .emit(BuildEvent::new(task.file_path.clone(), BuildTaskStatus::Queued));
        self.shared.queue.push(task);
        self.shared.wake.notify_one();
    }

    /// Wait until the queue is empty and no dispatch is in flight.
    ///
    /// Returns `false` if any batch failed since the last drain, then clears
    /// the failure flag and the task-bundle cache.
    pub async fn wait_until_drained(&self) -> bool {
        loop {
            let completed = self.shared.idle.notified();
            if self.shared.is_drained() {
                break;
            }
            tokio::select! {
                _ = completed => {}
                _ = tokio::time::sleep(self.shared.config.poll_interval) => {}
            }
        }

        let ok = !self.shared.failed.swap(false, Ordering::SeqCst);
        self.shared.ctx.cache.reset();
        info!(success = ok, "Build drained");
        ok
    }

    /// Run one discovery pass; returns the number of workers created
    pub async fn discover_once(&self) -> usize {
        self.shared.discover().await
    }

    /// Run one dispatch cycle; returns the number of batches started
    pub fn dispatch_once(&self) -> usize {
        self.shared.dispatch_cycle()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.shared.events.subscribe()
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Workers currently dispatching
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Queued plus in-flight tasks
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.len() + self.shared.in_flight_tasks.load(Ordering::SeqCst)
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.pool.idle_len()
    }

    pub fn known_peers(&self) -> usize {
        self.shared.pool.known_len()
    }
}

impl Shared {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    fn emit(&self, event: BuildEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn discovery_loop(self: Arc<Self>, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            info = self.ctx.hub.hub_info() => match info {
                Ok(info) => info!(hub = %info.node_id, version = %info.version, "Connected to hub"),
                Err(e) => warn!(error = %e, "Hub info unavailable"),
            },
        }

        let mut ticker = tokio::time::interval(self.config.discovery_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.discover() => {}
                    }
                }
            }
        }
        debug!("Discovery loop exited");
    }

    async fn discover(&self) -> usize {
        let peers = match self.ctx.hub.list_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "Peer listing failed, retrying next interval");
                return 0;
            }
        };

        let live: HashSet<String> = peers.iter().map(|p| p.node_id.clone()).collect();
        for node_id in self.pool.retain_peers(&live) {
            info!(node_id = %node_id, "Peer left the hub");
        }

        let mut admitted = 0;
        for peer in peers {
            if self.pool.is_known(&peer.node_id) {
                continue;
            }
            match self.ctx.hub.peer_hardware(&peer.node_id).await {
                Ok(hardware) => {
                    let node_id = peer.node_id.clone();
                    let cores = hardware.core_count;
                    if let Some(generation) = self.pool.admit(peer, hardware) {
                        info!(node_id = %node_id, cores, generation, "Worker joined");
                        admitted += 1;
                    }
                }
                Err(e) => {
                    warn!(node_id = %peer.node_id, error = %e, "Hardware query failed, skipping peer");
                }
            }
        }
        if admitted > 0 {
            self.wake.notify_one();
        }
        admitted
    }

    async fn dispatch_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.dispatch_cycle();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        debug!("Dispatch loop exited");
    }

    fn dispatch_cycle(self: &Arc<Self>) -> usize {
        let mut started = 0;
        while !self.queue.is_empty() {
            let Some(mut worker) = self.pool.checkout() else {
                break;
            };
            // Count before popping so drain never sees an empty queue with
            // tasks in nobody's hands.
            self.in_flight.fetch_add(1, Ordering::SeqCst);

            worker.clear_tasks();
            let n = worker.capacity().min(self.queue.len());
            for _ in 0..n {
                match self.queue.pop() {
                    Some(task) => worker.add_task(task),
                    None => break,
                }
            }
            if worker.tasks().is_empty() {
                self.pool.checkin(worker);
                self.finish_dispatch();
                break;
            }

            let count = worker.tasks().len();
            self.in_flight_tasks.fetch_add(count, Ordering::SeqCst);
            for task in worker.tasks() {
                self.emit(
                    BuildEvent::new(task.file_path.clone(), BuildTaskStatus::Started)
                        .on_node(worker.node_id()),
                );
            }
            debug!(node_id = worker.node_id(), tasks = count, "Claimed worker");
            tokio::spawn(Arc::clone(self).supervise(worker));
            started += 1;
        }
        started
    }

    async fn supervise(self: Arc<Self>, worker: Worker) {
        let node_id = worker.node_id().to_string();
        let generation = worker.generation();
        let files: Vec<PathBuf> = worker.tasks().iter().map(|t| t.file_path.clone()).collect();
        let session = worker.session();

        let ctx = self.ctx.clone();
        let mut handle = tokio::spawn(async move {
            let mut worker = worker;
            let outcome = worker.dispatch(&ctx).await;
            (worker, outcome)
        });

        let joined = match self.config.dispatch_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    handle.abort();
                    warn!(node_id = %node_id, timeout_secs = limit.as_secs(), "Dispatch timed out, retiring worker");
                    None
                }
            },
            None => Some(handle.await),
        };

        match joined {
            Some(Ok((worker, outcome))) => {
                self.record(&node_id, &files, &outcome);
                self.pool.checkin(worker);
            }
            Some(Err(e)) => {
                error!(node_id = %node_id, error = %e, "Dispatch task died, retiring worker");
                self.pool.retire(&node_id, generation);
                self.abandon_session(&session, &node_id).await;
                self.record(&node_id, &files, &BatchOutcome::failed(files.clone(), e.to_string()));
            }
            None => {
                self.pool.retire(&node_id, generation);
                self.abandon_session(&session, &node_id).await;
                let outcome = BatchOutcome::failed(files.clone(), "dispatch timed out".to_string());
                self.record(&node_id, &files, &outcome);
            }
        }

        self.in_flight_tasks.fetch_sub(files.len(), Ordering::SeqCst);
        self.finish_dispatch();
    }

    /// Drop the session of a worker that was reaped mid-dispatch
    async fn abandon_session(&self, session: &SessionSlot, node_id: &str) {
        if let Err(e) = session.end(self.ctx.hub.as_ref(), node_id).await {
            warn!(node_id = %node_id, error = %e, "Failed to drop abandoned session");
        }
    }

    fn record(&self, node_id: &str, files: &[PathBuf], outcome: &BatchOutcome) {
        if !outcome.succeeded() {
            self.failed.store(true, Ordering::SeqCst);
        }
        for file in files {
            let status = if outcome.task_succeeded(file) {
                BuildTaskStatus::Succeeded
            } else {
                BuildTaskStatus::Failed
            };
            let mut event = BuildEvent::new(file.clone(), status).on_node(node_id);
            if let Some(error) = &outcome.error {
                event = event.with_message(error.clone());
            }
            self.emit(event);
        }
    }

    fn finish_dispatch(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.wake.notify_one();
        self.idle.notify_waiters();
    }
}
