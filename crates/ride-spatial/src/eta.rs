//! ETA tracker collaborator attached to the ingest path (§4.1 ingest step 3,
//! §5 "long-running background tasks ... ETA tracker", §6 `active:ride`
//! key). Treated as an advisory observer with latest-wins semantics that
//! MUST NOT let its own failures affect location persistence (§9 open
//! question).

use {
    crate::kv::GeoKvStore,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    ride_core::{eta_minutes, CoreError, Coordinate},
    serde::{Deserialize, Serialize},
    std::{sync::Arc, time::Duration},
    uuid::Uuid,
};

const ACTIVE_RIDE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

fn active_ride_key(driver_id: Uuid) -> String {
    format!("active:ride:{driver_id}")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveRide {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub destination_lat: f64,
    pub destination_lng: f64,
    pub eta_minutes: i64,
    pub updated_at: DateTime<Utc>,
}

/// Fired in a detached task by the ingest path whenever a tracker is
/// attached; a failure here is logged by the caller and never surfaces to
/// `UpdateDriverLocation`'s result.
#[async_trait]
pub trait EtaTracker: Send + Sync {
    async fn notify_location_update(
        &self,
        driver_id: Uuid,
        at: &Coordinate,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// Default tracker: keeps `active:ride:<driver>` (§GLOSSARY "Active ride")
/// up to date with the driver's freshest ETA to the ride's destination.
pub struct KvEtaTracker {
    store: Arc<dyn GeoKvStore>,
}

impl KvEtaTracker {
    pub fn new(store: Arc<dyn GeoKvStore>) -> Self {
        Self { store }
    }

    pub async fn active_ride(&self, driver_id: Uuid) -> Result<Option<ActiveRide>, CoreError> {
        let Some(blob) = self.store.get(&active_ride_key(driver_id)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&blob).ok())
    }

    /// Called when a ride is matched; seeds the mapping the tracker updates
    /// on every subsequent location ping.
    pub async fn start(&self, active_ride: &ActiveRide) -> Result<(), CoreError> {
        let blob = serde_json::to_string(active_ride).map_err(CoreError::internal)?;
        self.store
            .set_ex(&active_ride_key(active_ride.driver_id), &blob, ACTIVE_RIDE_TTL)
            .await
    }

    /// Called when a ride ends; the mapping would otherwise just expire
    /// after its TTL, but dropping it immediately avoids stale ETAs leaking
    /// into a driver's next ride before the key ages out.
    pub async fn stop(&self, driver_id: Uuid) -> Result<(), CoreError> {
        self.store.del(&active_ride_key(driver_id)).await
    }
}

#[async_trait]
impl EtaTracker for KvEtaTracker {
    /// No active ride for this driver: a no-op, not an error. Latest-wins:
    /// a backdated location simply overwrites with a worse estimate, it is
    /// never rejected (§9 open question on location backdating).
    async fn notify_location_update(
        &self,
        driver_id: Uuid,
        at: &Coordinate,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let Some(mut active) = self.active_ride(driver_id).await? else {
            return Ok(());
        };
        let destination = Coordinate {
            lat: active.destination_lat,
            lng: active.destination_lng,
        };
        active.eta_minutes = eta_minutes(at.haversine_km(&destination));
        active.updated_at = timestamp;
        self.start(&active).await
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::kv::in_memory::InMemoryGeoKvStore};

    fn active_ride(driver_id: Uuid, destination: Coordinate) -> ActiveRide {
        ActiveRide {
            ride_id: Uuid::new_v4(),
            driver_id,
            destination_lat: destination.lat,
            destination_lng: destination.lng,
            eta_minutes: 999,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn notify_with_no_active_ride_is_a_no_op() {
        let tracker = KvEtaTracker::new(Arc::new(InMemoryGeoKvStore::new()));
        let driver_id = Uuid::new_v4();
        let at = Coordinate::new(40.7128, -74.0060).unwrap();
        tracker
            .notify_location_update(driver_id, &at, Utc::now())
            .await
            .unwrap();
        assert!(tracker.active_ride(driver_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notify_recomputes_eta_against_destination() {
        let tracker = KvEtaTracker::new(Arc::new(InMemoryGeoKvStore::new()));
        let driver_id = Uuid::new_v4();
        let destination = Coordinate::new(40.7128, -74.0060).unwrap();
        tracker.start(&active_ride(driver_id, destination)).await.unwrap();

        let at = Coordinate::new(40.7128, -74.0060).unwrap();
        tracker
            .notify_location_update(driver_id, &at, Utc::now())
            .await
            .unwrap();

        let updated = tracker.active_ride(driver_id).await.unwrap().unwrap();
        assert_eq!(updated.eta_minutes, 0);
    }

    #[tokio::test]
    async fn stop_clears_the_mapping() {
        let tracker = KvEtaTracker::new(Arc::new(InMemoryGeoKvStore::new()));
        let driver_id = Uuid::new_v4();
        let destination = Coordinate::new(40.7128, -74.0060).unwrap();
        tracker.start(&active_ride(driver_id, destination)).await.unwrap();
        tracker.stop(driver_id).await.unwrap();
        assert!(tracker.active_ride(driver_id).await.unwrap().is_none());
    }
}
