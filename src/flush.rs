//! The flush cycle: periodically push pending tally counts into the store.
//!
//! One tick snapshots the tally, attempts an independent store increment
//! per option, and clears only what succeeded. The timer is re-armed after
//! the tick body finishes, so a slow flush can never overlap the next one.

use crate::store::PollStoreWriter;
use crate::tally::TallyTable;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to do when a store write matches no poll record: the vote named an
/// option no poll knows about. Either way the write counts as a success
/// and the pending count is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownOptionPolicy {
    /// Silent no-op, matching the original behavior.
    Ignore,
    /// Log a warning so operators can spot bogus producers.
    Warn,
}

/// Result of one option's increment attempt within a tick.
#[derive(Debug)]
pub struct FlushOutcome {
    pub option: String,
    pub attempted: u64,
    /// Poll records the write landed on; 0 for an unknown option.
    pub matched: u64,
    pub error: Option<String>,
}

impl FlushOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Run one flush tick.
///
/// Snapshots the non-zero pending counts, then per option: write to the
/// store, and on success commit (clear) exactly the snapshotted count.
/// Options whose write failed keep their count, summed with anything that
/// arrived meanwhile, for the next tick. The tally lock is never held
/// across the store calls.
pub async fn run_flush_tick(
    tally: &TallyTable,
    store: &dyn PollStoreWriter,
    policy: UnknownOptionPolicy,
) -> Vec<FlushOutcome> {
    let snapshot = tally.snapshot();
    if snapshot.is_empty() {
        log::debug!("No new votes, skipping store update");
        return Vec::new();
    }

    log::info!("Updating store with {} pending option(s)", snapshot.len());

    let mut outcomes = Vec::with_capacity(snapshot.len());
    for (option, count) in snapshot {
        match store.increment_votes(&option, count).await {
            Ok(matched) => {
                if matched == 0 && policy == UnknownOptionPolicy::Warn {
                    log::warn!("Option '{}' matched no poll, {} vote(s) discarded", option, count);
                }
                tally.commit(&option, count);
                outcomes.push(FlushOutcome {
                    option,
                    attempted: count,
                    matched,
                    error: None,
                });
            }
            Err(e) => {
                log::warn!("Store update failed for '{}', will retry next tick: {}", option, e);
                outcomes.push(FlushOutcome {
                    option,
                    attempted: count,
                    matched: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed == 0 {
        log::info!("Store update complete, {} option(s) flushed", outcomes.len());
    } else {
        log::warn!("Store update partial: {} of {} option(s) failed", failed, outcomes.len());
    }

    outcomes
}

/// Timer loop driving [`run_flush_tick`].
///
/// The sleep is armed only after the previous tick's body has completed
/// (a one-shot timer re-armed each round, not a fixed-rate interval), so
/// ticks never overlap. Cancellation is observed between ticks only: once
/// `shutdown` fires no further tick starts, but a tick already in flight
/// runs to completion. Store failures never terminate the loop.
pub async fn flush_cycle_task(
    tally: Arc<TallyTable>,
    store: Arc<dyn PollStoreWriter>,
    interval: Duration,
    policy: UnknownOptionPolicy,
    shutdown: CancellationToken,
) {
    log::info!("Flush cycle started (interval: {:?})", interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                run_flush_tick(&tally, store.as_ref(), policy).await;
            }
        }
    }

    log::info!("Flush cycle stopped");
}
