use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory table of pending, unflushed vote counts keyed by option
/// identifier.
///
/// Shared between the ingestion path (increments) and the flush cycle
/// (snapshot + commit) via `Arc`. All access goes through one mutex; the
/// lock is only ever held for the map operation itself, never across I/O.
pub struct TallyTable {
    counts: Mutex<HashMap<String, u64>>,
}

impl TallyTable {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Add one pending vote for `option`, creating the entry if absent.
    ///
    /// Safe under unbounded concurrent callers; infallible.
    pub fn increment(&self, option: &str) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(option.to_string()).or_insert(0) += 1;
    }

    /// Copy of all entries with a non-zero pending count.
    ///
    /// The live table is left untouched: clearing happens per option via
    /// [`commit`](Self::commit) once that option's store write succeeded,
    /// so a failed write keeps its count pending for the next cycle.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        let counts = self.counts.lock().unwrap();
        counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(option, count)| (option.clone(), *count))
            .collect()
    }

    /// Clear `flushed` votes for `option` after a successful store write.
    ///
    /// Subtracts rather than resets: increments that arrived between the
    /// snapshot and the write completing stay pending, so a flushed count
    /// is cleared exactly once and nothing is lost. Entries that reach
    /// zero are removed, leaving the table empty once everything flushed.
    pub fn commit(&self, option: &str, flushed: u64) {
        let mut counts = self.counts.lock().unwrap();
        if let Some(count) = counts.get_mut(option) {
            *count = count.saturating_sub(flushed);
            if *count == 0 {
                counts.remove(option);
            }
        }
    }

    /// True when no votes are pending.
    pub fn is_empty(&self) -> bool {
        let counts = self.counts.lock().unwrap();
        counts.values().all(|count| *count == 0)
    }
}

impl Default for TallyTable {
    fn default() -> Self {
        Self::new()
    }
}
