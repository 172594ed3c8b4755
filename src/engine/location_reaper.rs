use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use crate::tracking::LocationStore;

/// Periodically evicts courier positions that have not been refreshed
/// within `ttl`.
pub async fn run_location_reaper(store: Arc<LocationStore>, interval: Duration, ttl: Duration) {
    if interval.is_zero() {
        warn!("location sweep interval is zero; reaper not started");
        return;
    }

    info!(
        interval_secs = interval.as_secs(),
        ttl_secs = ttl.as_secs(),
        "location reaper started"
    );

    let mut ticker = time::interval(interval);
    loop {
        ticker.tick().await;

        let evicted = store.sweep(ttl);
        if evicted > 0 {
            info!(evicted, remaining = store.len(), "evicted stale courier locations");
        } else {
            debug!(tracked = store.len(), "no stale courier locations");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::run_location_reaper;
    use crate::tracking::LocationStore;

    #[tokio::test]
    async fn reaper_evicts_entries_past_ttl() {
        let store = Arc::new(LocationStore::new());
        store.update(1, -6.2, 106.8);

        let handle = tokio::spawn(run_location_reaper(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_millis(50),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.get(1).is_ok());

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(store.get(1).is_err());
    }

    #[tokio::test]
    async fn zero_interval_returns_instead_of_spinning() {
        let store = Arc::new(LocationStore::new());
        store.update(1, -6.2, 106.8);

        run_location_reaper(store.clone(), Duration::ZERO, Duration::ZERO).await;

        assert!(store.get(1).is_ok());
    }
}
