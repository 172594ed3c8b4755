use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::location::{CourierLocation, GeoPoint};
use crate::models::CourierId;

/// Last reported position per courier.
///
/// Each entry is replaced as a whole, so readers never see a coordinate pair
/// assembled from two different writes.
#[derive(Default)]
pub struct LocationStore {
    entries: DashMap<CourierId, CourierLocation>,
}

impl LocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, courier_id: CourierId, lat: f64, lng: f64) -> CourierLocation {
        let entry = CourierLocation {
            courier_id,
            location: GeoPoint { lat, lng },
            updated_at: Utc::now(),
        };
        self.entries.insert(courier_id, entry.clone());
        entry
    }

    pub fn get(&self, courier_id: CourierId) -> Result<GeoPoint, AppError> {
        self.entries
            .get(&courier_id)
            .map(|entry| entry.location)
            .ok_or_else(|| {
                AppError::NotFound(format!("no location reported for courier {courier_id}"))
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry last updated more than `ttl` ago.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };

        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.updated_at >= cutoff);
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::LocationStore;
    use crate::error::AppError;

    #[test]
    fn unknown_courier_is_not_found() {
        let store = LocationStore::new();
        assert!(matches!(store.get(404), Err(AppError::NotFound(_))));
    }

    #[test]
    fn second_update_overwrites_first() {
        let store = LocationStore::new();
        store.update(1, 1.0, 2.0);
        store.update(1, -6.2, 106.8);

        let point = store.get(1).unwrap();
        assert_eq!((point.lat, point.lng), (-6.2, 106.8));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_never_tear_a_pair() {
        let store = Arc::new(LocationStore::new());
        let mut handles = Vec::new();

        // Every writer stores lat == -lng, so a torn read would break the relation.
        for writer in 0..8u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..2_000u32 {
                    let value = f64::from(writer * 10_000 + i);
                    store.update(7, value, -value);
                }
            }));
        }

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..5_000 {
                    if let Ok(point) = store.get(7) {
                        assert_eq!(point.lat, -point.lng);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for handle in handles {
            handle.await.unwrap();
        }
        reader.await.unwrap();

        store.update(7, 3.5, 4.5);
        let point = store.get(7).unwrap();
        assert_eq!((point.lat, point.lng), (3.5, 4.5));
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let store = LocationStore::new();
        store.update(1, 0.0, 0.0);
        std::thread::sleep(Duration::from_millis(30));
        store.update(2, 1.0, 1.0);

        let evicted = store.sweep(Duration::from_millis(15));

        assert_eq!(evicted, 1);
        assert!(store.get(1).is_err());
        assert!(store.get(2).is_ok());
    }
}
