use crate::bus::VoteHandler;
use crate::tally::TallyTable;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns raw bus payloads into tally increments.
///
/// The payload is the option identifier as UTF-8 bytes, nothing more. No
/// validation against a known option set happens here: unknown options are
/// counted and the store's selector decides what they land on.
pub struct VoteIngestor {
    tally: Arc<TallyTable>,
}

impl VoteIngestor {
    pub fn new(tally: Arc<TallyTable>) -> Self {
        Self { tally }
    }
}

#[async_trait]
impl VoteHandler for VoteIngestor {
    /// Never fails for a structurally valid payload, so the bus never sees
    /// a reason to redeliver. The lossy conversion mirrors the original
    /// byte-to-string cast: it cannot error.
    async fn on_vote(&self, payload: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if payload.is_empty() {
            // An empty identifier can never match a poll's option set;
            // acknowledge and drop rather than tally a vote for "".
            log::debug!("Dropping empty vote payload");
            return Ok(());
        }

        let option = String::from_utf8_lossy(payload);
        self.tally.increment(&option);
        log::debug!("Counted vote for '{}'", option);
        Ok(())
    }
}
