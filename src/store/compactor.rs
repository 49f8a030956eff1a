use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ReservationBook;

/// Periodically rewrite the WAL once `threshold` appends have piled up since the last rewrite.
pub async fn run_compactor(book: Arc<ReservationBook>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let appends = match book.appends_since_compact().await {
            Ok(n) => n,
            Err(e) => {
                warn!("compactor: {e}");
                continue;
            }
        };
        if appends < threshold {
            debug!("compactor: {appends} appends since last compaction, below {threshold}");
            continue;
        }
        match book.compact_wal().await {
            Ok(kept) => info!("compacted WAL: {appends} appends folded into {kept} records"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
