//! Demand heatmap (§4.1 "Demand").

use {
    crate::{
        cell::{cell, cell_center, k_ring, CellTier},
        kv::GeoKvStore,
    },
    ride_core::{CoreError, Coordinate},
    serde::{Deserialize, Serialize},
    std::{sync::Arc, time::Duration},
};

const DEMAND_TTL: Duration = Duration::from_secs(15 * 60);
const HEATMAP_RADIUS: u32 = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemandInfo {
    pub h3_cell_res7: String,
    pub request_count: u32,
    pub center_lat: f64,
    pub center_lng: f64,
}

pub struct DemandIndex {
    store: Arc<dyn GeoKvStore>,
}

impl DemandIndex {
    pub fn new(store: Arc<dyn GeoKvStore>) -> Self {
        Self { store }
    }

    /// Increments the origin cell's request count, creating it with a
    /// fresh TTL if absent (§4.1 "monotonically increasing within TTL
    /// window").
    pub async fn increment_demand(&self, at: &Coordinate) -> Result<DemandInfo, CoreError> {
        let cell_id = cell(at, CellTier::Demand);
        let key = demand_key(&cell_id);
        let mut info = match self.store.get(&key).await? {
            Some(blob) => serde_json::from_str(&blob).unwrap_or_else(|_| fresh_demand(&cell_id)),
            None => fresh_demand(&cell_id),
        };
        info.request_count += 1;
        let blob = serde_json::to_string(&info).map_err(CoreError::internal)?;
        self.store.set_ex(&key, &blob, DEMAND_TTL).await?;
        Ok(info)
    }

    /// Heatmap points for the k-ring of radius 3 around `at`'s cell,
    /// filtered to cells with at least one request (§4.1 "GetDemandHeatmap").
    pub async fn demand_heatmap(&self, at: &Coordinate) -> Result<Vec<DemandInfo>, CoreError> {
        let origin = cell(at, CellTier::Demand);
        let mut points = Vec::new();
        for cell_id in k_ring(&origin, HEATMAP_RADIUS) {
            if let Some(blob) = self.store.get(&demand_key(&cell_id)).await? {
                if let Ok(info) = serde_json::from_str::<DemandInfo>(&blob) {
                    if info.request_count > 0 {
                        points.push(info);
                    }
                }
            }
        }
        Ok(points)
    }
}

fn fresh_demand(cell_id: &str) -> DemandInfo {
    let (center_lat, center_lng) = cell_center(cell_id).unwrap_or((0.0, 0.0));
    DemandInfo {
        h3_cell_res7: cell_id.to_string(),
        request_count: 0,
        center_lat,
        center_lng,
    }
}

fn demand_key(cell_id: &str) -> String {
    format!("h3:demand:{cell_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::in_memory::InMemoryGeoKvStore;

    #[tokio::test]
    async fn increment_demand_is_monotonic() {
        let index = DemandIndex::new(Arc::new(InMemoryGeoKvStore::new()));
        let point = Coordinate::new(40.7128, -74.0060).unwrap();
        index.increment_demand(&point).await.unwrap();
        let second = index.increment_demand(&point).await.unwrap();
        assert_eq!(second.request_count, 2);
    }

    #[tokio::test]
    async fn heatmap_excludes_cells_without_requests() {
        let index = DemandIndex::new(Arc::new(InMemoryGeoKvStore::new()));
        let point = Coordinate::new(40.7128, -74.0060).unwrap();
        index.increment_demand(&point).await.unwrap();
        let heatmap = index.demand_heatmap(&point).await.unwrap();
        assert_eq!(heatmap.len(), 1);
        assert!(heatmap[0].request_count > 0);
    }
}
