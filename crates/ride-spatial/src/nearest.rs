//! Nearest-driver and availability queries (§4.1 "Nearest-driver query",
//! "Availability filter").

use {
    crate::location::{DriverLocation, DriverStatus, SpatialIndex},
    ride_core::{eta_minutes, CoreError, Coordinate},
    uuid::Uuid,
};

const SEARCH_RADIUS_KM: f64 = 10.0;

#[derive(Clone, Debug)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
    pub eta_minutes: i64,
}

impl SpatialIndex {
    /// Over-fetches `2k` geo-index candidates within `SEARCH_RADIUS_KM`,
    /// drops any whose location blob is missing or unparseable, recomputes
    /// distance via Haversine, filters to the radius, sorts ascending and
    /// returns the first `k` (§4.1 "Nearest-driver query").
    pub async fn find_nearby_drivers(
        &self,
        at: &Coordinate,
        k: usize,
    ) -> Result<Vec<NearbyDriver>, CoreError> {
        let started = std::time::Instant::now();
        let candidates = self
            .geo_search_candidates(at, SEARCH_RADIUS_KM, k.saturating_mul(2).max(1))
            .await?;

        let mut hits = Vec::with_capacity(candidates.len());
        for loc in candidates {
            let candidate = Coordinate { lat: loc.lat, lng: loc.lng };
            let distance_km = at.haversine_km(&candidate);
            if distance_km <= SEARCH_RADIUS_KM {
                hits.push(NearbyDriver {
                    driver_id: loc.driver_id,
                    lat: loc.lat,
                    lng: loc.lng,
                    distance_km,
                    eta_minutes: eta_minutes(distance_km),
                });
            }
        }
        hits.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        hits.truncate(k);
        crate::metrics::metrics()
            .nearest_query_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        Ok(hits)
    }

    /// `FindNearbyDrivers(at, 2k)` filtered down to `available` drivers,
    /// stopping once `k` are collected (§4.1 "Availability filter").
    pub async fn find_available_drivers(
        &self,
        at: &Coordinate,
        k: usize,
    ) -> Result<Vec<NearbyDriver>, CoreError> {
        let candidates = self.find_nearby_drivers(at, k.saturating_mul(2).max(1)).await?;
        let mut available = Vec::with_capacity(k);
        for candidate in candidates {
            if available.len() == k {
                break;
            }
            if self.driver_status(candidate.driver_id).await? == Some(DriverStatus::Available) {
                available.push(candidate);
            }
        }
        Ok(available)
    }

    async fn geo_search_candidates(
        &self,
        at: &Coordinate,
        radius_km: f64,
        count: usize,
    ) -> Result<Vec<DriverLocation>, CoreError> {
        let raw_hits = self.geo_index_search(at, radius_km, count).await?;
        let mut locations = Vec::with_capacity(raw_hits.len());
        for driver_id in raw_hits {
            if let Some(loc) = self.driver_location(driver_id).await? {
                locations.push(loc);
            }
        }
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{kv::in_memory::InMemoryGeoKvStore, location::DriverStatus},
        std::sync::Arc,
    };

    async fn seed_driver(index: &SpatialIndex, lat: f64, lng: f64, available: bool) -> Uuid {
        let driver_id = Uuid::new_v4();
        let coordinate = Coordinate::new(lat, lng).unwrap();
        let loc = DriverLocation {
            driver_id,
            lat,
            lng,
            h3_cell_res9: crate::cell::cell(&coordinate, crate::cell::CellTier::Matching),
            heading: None,
            speed: None,
            timestamp: chrono::Utc::now(),
        };
        index.write_location(&loc).await.unwrap();
        index
            .set_driver_status(
                driver_id,
                if available { DriverStatus::Available } else { DriverStatus::Busy },
            )
            .await
            .unwrap();
        driver_id
    }

    #[tokio::test]
    async fn nearby_drivers_are_ordered_by_distance() {
        let index = SpatialIndex::new(Arc::new(InMemoryGeoKvStore::new()));
        let far = seed_driver(&index, 40.8, -74.2, true).await;
        let near = seed_driver(&index, 40.713, -74.007, true).await;
        let origin = Coordinate::new(40.7128, -74.0060).unwrap();
        let hits = index.find_nearby_drivers(&origin, 5).await.unwrap();
        assert_eq!(hits[0].driver_id, near);
        assert!(hits.iter().any(|h| h.driver_id == far));
        assert!(hits[0].distance_km <= hits[1].distance_km);
    }

    #[tokio::test]
    async fn availability_filter_drops_busy_drivers() {
        let index = SpatialIndex::new(Arc::new(InMemoryGeoKvStore::new()));
        seed_driver(&index, 40.713, -74.007, false).await;
        let available_id = seed_driver(&index, 40.714, -74.008, true).await;
        let origin = Coordinate::new(40.7128, -74.0060).unwrap();
        let hits = index.find_available_drivers(&origin, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].driver_id, available_id);
    }
}
