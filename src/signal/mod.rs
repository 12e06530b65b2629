//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! On the first signal the service token is cancelled: the scheduler stops
//! dispatching, idle sessions are dropped and the delivery endpoint drains.
//! A second signal asks the caller to exit without waiting.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code used when a second signal cuts shutdown short
pub const EXIT_CODE_INTERRUPTED: u8 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: begin graceful shutdown
    InitiateShutdown,
    /// Second signal: stop waiting
    ImmediateExit,
    Ignore,
}

/// Signal counter shared between the listener and the shutdown path
#[derive(Debug, Default)]
pub struct SignalState {
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_count() >= 1
    }

    pub fn is_immediate_exit(&self) -> bool {
        self.signal_count() >= 2
    }

    pub fn handle_signal(&self) -> SignalAction {
        let previous = self
            .signal_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(1)))
            .unwrap_or(u8::MAX);
        match previous {
            0 => SignalAction::InitiateShutdown,
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Spawn a listener that cancels `shutdown` on the first signal and
/// `abort` on the second
pub fn install(
    state: Arc<SignalState>,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = next_signal().await {
                warn!(error = %e, "Signal listener unavailable");
                return;
            }
            match state.handle_signal() {
                SignalAction::InitiateShutdown => {
                    info!("Received interrupt, shutting down");
                    shutdown.cancel();
                }
                SignalAction::ImmediateExit => {
                    warn!("Received second interrupt, exiting immediately");
                    abort.cancel();
                    return;
                }
                SignalAction::Ignore => {}
            }
        }
    })
}

#[cfg(unix)]
async fn next_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
