use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::store::JournalStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's journal once enough appends
/// have piled up since the last compaction.
pub async fn run_compactor(store: Arc<JournalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran.
pub async fn compact_if_due(store: &JournalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(crate::observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
            info!(appends, slots = store.slot_count(), "journal compacted");
            true
        }
        Err(e) => {
            error!("journal compaction failed: {e}");
            false
        }
    }
}
