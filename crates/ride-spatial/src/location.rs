//! Driver location ingest, cell-set maintenance and the `LocationBuffer`
//! write-batching front door (§4.1 "Ingest path", "LocationBuffer",
//! "Cell-set maintenance").

use {
    crate::{
        cell::{cell, CellTier},
        eta::EtaTracker,
        kv::GeoKvStore,
    },
    chrono::{DateTime, Utc},
    ride_core::{CoreError, Coordinate},
    serde::{Deserialize, Serialize},
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::sync::Notify,
    uuid::Uuid,
};

const LOCATION_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

impl DriverStatus {
    fn as_str(self) -> &'static str {
        match self {
            DriverStatus::Available => "available",
            DriverStatus::Busy => "busy",
            DriverStatus::Offline => "offline",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverLocation {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub h3_cell_res9: String,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct StatusRecord {
    status: String,
    timestamp: DateTime<Utc>,
}

fn location_key(driver_id: Uuid) -> String {
    format!("driver:location:{driver_id}")
}

fn h3cell_key(driver_id: Uuid) -> String {
    format!("driver:h3cell:{driver_id}")
}

fn status_key(driver_id: Uuid) -> String {
    format!("driver:status:{driver_id}")
}

fn cell_member_key(cell_id: &str, driver_id: Uuid) -> String {
    format!("h3:drivers:{cell_id}:{driver_id}")
}

const GEO_INDEX_KEY: &str = "drivers:geo:index";

/// Direct, synchronous writer against the KV store. `LocationBuffer` is an
/// optional front door in front of this; when no buffer is attached, the
/// ingest entrypoint calls these methods straight away (§4.1 ingest path).
pub struct SpatialIndex {
    store: Arc<dyn GeoKvStore>,
}

impl SpatialIndex {
    pub fn new(store: Arc<dyn GeoKvStore>) -> Self {
        Self { store }
    }

    /// Writes the location blob, the geo-index entry, and maintains cell-set
    /// membership, moving the driver out of its previous cell if it changed
    /// (§4.1 "Cell-set maintenance").
    pub async fn write_location(&self, loc: &DriverLocation) -> Result<(), CoreError> {
        let blob = serde_json::to_string(loc).map_err(CoreError::internal)?;
        self.store
            .set_ex(&location_key(loc.driver_id), &blob, LOCATION_TTL)
            .await?;
        self.store
            .geo_add(GEO_INDEX_KEY, &loc.driver_id.to_string(), loc.lat, loc.lng)
            .await?;

        let previous_cell = self.store.get(&h3cell_key(loc.driver_id)).await?;
        if previous_cell.as_deref() != Some(loc.h3_cell_res9.as_str()) {
            if let Some(previous) = previous_cell {
                self.store
                    .del(&cell_member_key(&previous, loc.driver_id))
                    .await?;
            }
            self.store
                .set_ex(
                    &cell_member_key(&loc.h3_cell_res9, loc.driver_id),
                    &loc.driver_id.to_string(),
                    LOCATION_TTL,
                )
                .await?;
        }
        self.store
            .set_ex(&h3cell_key(loc.driver_id), &loc.h3_cell_res9, LOCATION_TTL)
            .await
    }

    pub async fn driver_location(&self, driver_id: Uuid) -> Result<Option<DriverLocation>, CoreError> {
        let Some(blob) = self.store.get(&location_key(driver_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&blob) {
            Ok(loc) => Ok(Some(loc)),
            Err(_) => Ok(None),
        }
    }

    pub async fn set_driver_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
    ) -> Result<(), CoreError> {
        let record = StatusRecord {
            status: status.as_str().to_string(),
            timestamp: Utc::now(),
        };
        let blob =
            serde_json::to_string(&record).map_err(CoreError::internal)?;
        self.store
            .set_ex(&status_key(driver_id), &blob, LOCATION_TTL)
            .await?;
        if status == DriverStatus::Offline {
            self.remove_driver(driver_id).await?;
        }
        Ok(())
    }

    pub async fn driver_status(&self, driver_id: Uuid) -> Result<Option<DriverStatus>, CoreError> {
        let Some(blob) = self.store.get(&status_key(driver_id)).await? else {
            return Ok(None);
        };
        let Ok(record) = serde_json::from_str::<StatusRecord>(&blob) else {
            return Ok(None);
        };
        Ok(Some(match record.status.as_str() {
            "available" => DriverStatus::Available,
            "busy" => DriverStatus::Busy,
            _ => DriverStatus::Offline,
        }))
    }

    /// Removes the driver from the geo-index and its cell-set entry (§3
    /// Driver Status: "offline transition MUST remove the driver from the
    /// geo-index and cell-sets").
    pub async fn remove_driver(&self, driver_id: Uuid) -> Result<(), CoreError> {
        self.store
            .geo_rem(GEO_INDEX_KEY, &driver_id.to_string())
            .await?;
        if let Some(cell_id) = self.store.get(&h3cell_key(driver_id)).await? {
            self.store.del(&cell_member_key(&cell_id, driver_id)).await?;
        }
        self.store.del(&h3cell_key(driver_id)).await
    }

    /// Raw geo-index lookup: driver ids within `radius_km` of `at`, nearest
    /// first, capped at `count`. Unparseable members (there shouldn't be
    /// any) are silently skipped.
    pub(crate) async fn geo_index_search(
        &self,
        at: &ride_core::Coordinate,
        radius_km: f64,
        count: usize,
    ) -> Result<Vec<Uuid>, CoreError> {
        let hits = self
            .store
            .geo_search(GEO_INDEX_KEY, at.lat, at.lng, radius_km, count)
            .await?;
        Ok(hits
            .into_iter()
            .filter_map(|(member, _distance)| member.parse().ok())
            .collect())
    }
}

/// One pending location sample per driver, staged for the next flush
/// (§4.1 "Deduplication: for each driver, only the latest enqueued sample is
/// retained per flush").
#[derive(Default)]
struct Staging {
    samples: HashMap<Uuid, DriverLocation>,
    stopped: bool,
}

pub struct LocationBufferConfig {
    pub flush_interval: Duration,
    pub max_buffer_size: usize,
}

impl Default for LocationBufferConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(2),
            max_buffer_size: 500,
        }
    }
}

/// Bounded write-batching front door for [`SpatialIndex::write_location`].
/// `Enqueue` never blocks on I/O; a background task drains the staging map
/// either on an interval tick or when a flush signal fires, coalescing
/// samples per driver (§4.1 "LocationBuffer"). `Notify::notify_one` already
/// coalesces redundant wakeups, matching "queueing at most one pending
/// signal" without any extra bookkeeping.
pub struct LocationBuffer {
    index: Arc<SpatialIndex>,
    staging: Mutex<Staging>,
    flush_signal: Notify,
    max_buffer_size: usize,
}

impl LocationBuffer {
    pub fn spawn(index: Arc<SpatialIndex>, config: LocationBufferConfig) -> Arc<Self> {
        let buffer = Arc::new(Self {
            index,
            staging: Mutex::new(Staging::default()),
            flush_signal: Notify::new(),
            max_buffer_size: config.max_buffer_size,
        });
        let task_buffer = buffer.clone();
        tokio::spawn(async move { task_buffer.run(config.flush_interval).await });
        buffer
    }

    /// Non-blocking. Overwrites any already-staged sample for this driver.
    pub fn enqueue(&self, loc: DriverLocation) {
        let mut staging = self.staging.lock().unwrap();
        if staging.stopped {
            return;
        }
        let driver_id = loc.driver_id;
        staging.samples.insert(driver_id, loc);
        if staging.samples.len() >= self.max_buffer_size {
            self.flush_signal.notify_one();
        }
    }

    /// Drains whatever remains, then marks the buffer closed so subsequent
    /// `enqueue` calls are no-ops (§4.1 "On Stop: drains remaining samples
    /// before returning; subsequent Enqueue is a no-op").
    pub async fn stop(&self) {
        let batch = {
            let mut staging = self.staging.lock().unwrap();
            staging.stopped = true;
            std::mem::take(&mut staging.samples)
        };
        self.flush_batch(batch).await;
    }

    async fn run(self: Arc<Self>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.flush_signal.notified() => {}
            }
            let batch = {
                let mut staging = self.staging.lock().unwrap();
                if staging.stopped {
                    return;
                }
                std::mem::take(&mut staging.samples)
            };
            self.flush_batch(batch).await;
        }
    }

    async fn flush_batch(&self, batch: HashMap<Uuid, DriverLocation>) {
        let started = std::time::Instant::now();
        let size = batch.len();
        for (driver_id, loc) in batch {
            if let Err(err) = self.index.write_location(&loc).await {
                tracing::warn!(%driver_id, ?err, "location buffer flush failed for driver");
            }
        }
        let metrics = crate::metrics::metrics();
        metrics.buffer_flush_batch_size.observe(size as f64);
        metrics
            .buffer_flush_duration_seconds
            .observe(started.elapsed().as_secs_f64());
    }
}

/// Public entrypoint for `UpdateDriverLocation` (§4.1 "Ingest path"). Reads
/// `heading`/`speed` as 0 when absent per §7 "Optional fields ... absent ->
/// default 0" is *not* applied here -- those remain `None` through to
/// storage; only derived computations default them to 0.
///
/// If `tracker` is attached, its notification is fired in a detached task:
/// the tracker is an advisory observer and its failures must never affect
/// location persistence (§4.1 ingest step 3, §9 open question).
pub async fn update_driver_location(
    index: &SpatialIndex,
    buffer: Option<&LocationBuffer>,
    tracker: Option<&Arc<dyn EtaTracker>>,
    driver_id: Uuid,
    lat: f64,
    lng: f64,
    heading: Option<f64>,
    speed: Option<f64>,
) -> Result<(), CoreError> {
    let coordinate = Coordinate::new(lat, lng)?;
    let h3_cell_res9 = cell(&coordinate, CellTier::Matching);
    let timestamp = Utc::now();

    if let Some(tracker) = tracker {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            if let Err(err) = tracker
                .notify_location_update(driver_id, &coordinate, timestamp)
                .await
            {
                tracing::warn!(%driver_id, ?err, "eta tracker notification failed");
            }
        });
    }

    let loc = DriverLocation {
        driver_id,
        lat,
        lng,
        h3_cell_res9,
        heading,
        speed,
        timestamp,
    };
    match buffer {
        Some(buffer) => {
            buffer.enqueue(loc);
            Ok(())
        }
        None => index.write_location(&loc).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::in_memory::InMemoryGeoKvStore;

    fn sample(driver_id: Uuid, lat: f64, lng: f64) -> DriverLocation {
        let coordinate = Coordinate::new(lat, lng).unwrap();
        DriverLocation {
            driver_id,
            lat,
            lng,
            h3_cell_res9: cell(&coordinate, CellTier::Matching),
            heading: None,
            speed: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let index = SpatialIndex::new(Arc::new(InMemoryGeoKvStore::new()));
        let driver_id = Uuid::new_v4();
        let loc = sample(driver_id, 40.7128, -74.0060);
        index.write_location(&loc).await.unwrap();
        let read = index.driver_location(driver_id).await.unwrap().unwrap();
        assert_eq!(read.driver_id, driver_id);
    }

    #[tokio::test]
    async fn offline_removes_driver_from_geo_index() {
        let store = Arc::new(InMemoryGeoKvStore::new());
        let index = SpatialIndex::new(store.clone());
        let driver_id = Uuid::new_v4();
        index
            .write_location(&sample(driver_id, 40.7128, -74.0060))
            .await
            .unwrap();
        index
            .set_driver_status(driver_id, DriverStatus::Offline)
            .await
            .unwrap();
        let hits = store
            .geo_search(GEO_INDEX_KEY, 40.7128, -74.0060, 10.0, 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn buffer_dedupes_same_driver_across_enqueues() {
        let index = Arc::new(SpatialIndex::new(Arc::new(InMemoryGeoKvStore::new())));
        let buffer = LocationBuffer::spawn(
            index.clone(),
            LocationBufferConfig {
                flush_interval: Duration::from_secs(3600),
                max_buffer_size: 1000,
            },
        );
        let driver_id = Uuid::new_v4();
        buffer.enqueue(sample(driver_id, 40.7128, -74.0060));
        buffer.enqueue(sample(driver_id, 41.0, -75.0));
        buffer.stop().await;
        let read = index.driver_location(driver_id).await.unwrap().unwrap();
        assert_eq!(read.lat, 41.0);
    }
}
