//! `GeoKvStore` — the boundary between the index's business logic and
//! whatever key/value + geospatial engine backs it in production (§4.1
//! "Expansion: KV trait boundary").

use {async_trait::async_trait, ride_core::CoreError, std::time::Duration};

/// A geo-indexed, TTL-aware key/value store. Every method maps errors into
/// [`CoreError::internal`] (§4.1 "Failure semantics": "KV errors surface as
/// internal failures"); a missing key is not an error, it's `None` / empty.
#[async_trait]
pub trait GeoKvStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    async fn del(&self, key: &str) -> Result<(), CoreError>;

    async fn geo_add(&self, key: &str, member: &str, lat: f64, lng: f64) -> Result<(), CoreError>;
    async fn geo_rem(&self, key: &str, member: &str) -> Result<(), CoreError>;
    /// Members within `radius_km` of `(lat, lng)`, ascending by distance,
    /// capped at `count` results. Returns `(member, distance_km)` pairs.
    async fn geo_search(
        &self,
        key: &str,
        lat: f64,
        lng: f64,
        radius_km: f64,
        count: usize,
    ) -> Result<Vec<(String, f64)>, CoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CoreError>;
    async fn set_rem(&self, key: &str, member: &str) -> Result<(), CoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, CoreError>;
}

/// In-process implementation used by tests and by any deployment that
/// doesn't need the index to survive a process restart.
pub mod in_memory {
    use {
        super::GeoKvStore,
        async_trait::async_trait,
        ride_core::{CoreError, Coordinate},
        std::{
            collections::{HashMap, HashSet},
            sync::Mutex,
            time::{Duration, Instant},
        },
    };

    struct Expiring<T> {
        value: T,
        expires_at: Option<Instant>,
    }

    impl<T> Expiring<T> {
        fn live(&self) -> bool {
            self.expires_at.map(|at| Instant::now() < at).unwrap_or(true)
        }
    }

    #[derive(Default)]
    pub struct InMemoryGeoKvStore {
        strings: Mutex<HashMap<String, Expiring<String>>>,
        geo: Mutex<HashMap<String, HashMap<String, (f64, f64)>>>,
        sets: Mutex<HashMap<String, HashSet<String>>>,
    }

    impl InMemoryGeoKvStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GeoKvStore for InMemoryGeoKvStore {
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoreError> {
            self.strings.lock().unwrap().insert(
                key.to_string(),
                Expiring {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
            let mut strings = self.strings.lock().unwrap();
            match strings.get(key) {
                Some(entry) if entry.live() => Ok(Some(entry.value.clone())),
                Some(_) => {
                    strings.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        }

        async fn del(&self, key: &str) -> Result<(), CoreError> {
            self.strings.lock().unwrap().remove(key);
            Ok(())
        }

        async fn geo_add(
            &self,
            key: &str,
            member: &str,
            lat: f64,
            lng: f64,
        ) -> Result<(), CoreError> {
            self.geo
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string(), (lat, lng));
            Ok(())
        }

        async fn geo_rem(&self, key: &str, member: &str) -> Result<(), CoreError> {
            if let Some(members) = self.geo.lock().unwrap().get_mut(key) {
                members.remove(member);
            }
            Ok(())
        }

        async fn geo_search(
            &self,
            key: &str,
            lat: f64,
            lng: f64,
            radius_km: f64,
            count: usize,
        ) -> Result<Vec<(String, f64)>, CoreError> {
            let origin = Coordinate { lat, lng };
            let geo = self.geo.lock().unwrap();
            let Some(members) = geo.get(key) else {
                return Ok(Vec::new());
            };
            let mut hits: Vec<(String, f64)> = members
                .iter()
                .map(|(member, &(mlat, mlng))| {
                    let point = Coordinate { lat: mlat, lng: mlng };
                    (member.clone(), origin.haversine_km(&point))
                })
                .filter(|(_, distance)| *distance <= radius_km)
                .collect();
            hits.sort_by(|a, b| a.1.total_cmp(&b.1));
            hits.truncate(count);
            Ok(hits)
        }

        async fn set_add(&self, key: &str, member: &str) -> Result<(), CoreError> {
            self.sets
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string());
            Ok(())
        }

        async fn set_rem(&self, key: &str, member: &str) -> Result<(), CoreError> {
            if let Some(members) = self.sets.lock().unwrap().get_mut(key) {
                members.remove(member);
            }
            Ok(())
        }

        async fn set_members(&self, key: &str) -> Result<Vec<String>, CoreError> {
            Ok(self
                .sets
                .lock()
                .unwrap()
                .get(key)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn string_entry_expires_after_ttl() {
            let store = InMemoryGeoKvStore::new();
            store
                .set_ex("k", "v", Duration::from_millis(10))
                .await
                .unwrap();
            assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(store.get("k").await.unwrap(), None);
        }

        #[tokio::test]
        async fn geo_search_filters_by_radius_and_sorts_ascending() {
            let store = InMemoryGeoKvStore::new();
            store.geo_add("idx", "near", 40.7128, -74.0060).await.unwrap();
            store.geo_add("idx", "far", 51.5074, -0.1278).await.unwrap();
            let hits = store
                .geo_search("idx", 40.7128, -74.0060, 10.0, 10)
                .await
                .unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].0, "near");
        }
    }
}
