//! Process-wide shutdown sequencing.
//!
//! One coordinator owns the cancellation tokens handed to the flush cycle
//! and the bus consumer, plus their join handles. Shutdown order matters:
//! the flush timer is stopped first so no further tick is scheduled, then
//! the bus is told to stop delivering; the process exits only after the
//! consumer's own completion (its "stopped" acknowledgment) or a bounded
//! timeout.

use crate::bus::BusError;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Stopping,
    Stopped,
}

pub struct LifecycleCoordinator {
    state: Mutex<LifecycleState>,
    flush_cancel: CancellationToken,
    bus_cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<Result<(), BusError>>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Running),
            flush_cancel: CancellationToken::new(),
            bus_cancel: CancellationToken::new(),
            consumer: Mutex::new(None),
            flusher: Mutex::new(None),
        }
    }

    /// Token observed by the flush cycle.
    pub fn flush_token(&self) -> CancellationToken {
        self.flush_cancel.clone()
    }

    /// Token observed by the bus consumer.
    pub fn bus_token(&self) -> CancellationToken {
        self.bus_cancel.clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    pub fn attach_consumer(&self, handle: JoinHandle<Result<(), BusError>>) {
        *self.consumer.lock().unwrap() = Some(handle);
    }

    pub fn attach_flusher(&self, handle: JoinHandle<()>) {
        *self.flusher.lock().unwrap() = Some(handle);
    }

    /// Begin shutdown. Idempotent: only the first call transitions
    /// Running -> Stopping and fires the tokens.
    ///
    /// Order: flush timer first (no new ticks; an in-flight tick
    /// completes), then the bus consumer.
    pub fn request_shutdown(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != LifecycleState::Running {
                log::debug!("Shutdown already in progress");
                return;
            }
            *state = LifecycleState::Stopping;
        }

        log::info!("Shutdown requested, stopping flush cycle");
        self.flush_cancel.cancel();
        log::info!("Stopping bus consumer");
        self.bus_cancel.cancel();
    }

    /// Block until the bus consumer acknowledges it has stopped (its task
    /// completes), then until the flush task has wound down, each within
    /// `limit`. On timeout the failure is logged and control returns
    /// anyway so the process can exit rather than hang.
    ///
    /// Votes counted after the last completed tick are discarded here by
    /// design: no flush-on-shutdown is performed, matching the original
    /// behavior.
    pub async fn await_stopped(&self, limit: Duration) {
        let consumer = self.consumer.lock().unwrap().take();
        if let Some(handle) = consumer {
            match timeout(limit, handle).await {
                Ok(Ok(Ok(()))) => log::info!("Bus consumer stopped"),
                Ok(Ok(Err(e))) => log::warn!("Bus consumer stopped with error: {}", e),
                Ok(Err(e)) => log::error!("Bus consumer task panicked: {}", e),
                Err(_) => {
                    log::error!("Bus consumer did not stop within {:?}, exiting anyway", limit)
                }
            }
        }

        let flusher = self.flusher.lock().unwrap().take();
        if let Some(handle) = flusher {
            match timeout(limit, handle).await {
                Ok(_) => log::info!("Flush cycle stopped"),
                Err(_) => {
                    log::error!("Flush cycle did not stop within {:?}, exiting anyway", limit)
                }
            }
        }

        *self.state.lock().unwrap() = LifecycleState::Stopped;
    }
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
