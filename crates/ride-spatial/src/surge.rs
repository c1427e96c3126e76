//! Surge pricing (§4.1 "Surge").

use {
    crate::{
        cell::{cell, CellTier},
        kv::GeoKvStore,
    },
    ride_core::{CoreError, Coordinate},
    serde::{Deserialize, Serialize},
    std::{sync::Arc, time::Duration},
};

const SURGE_TTL: Duration = Duration::from_secs(5 * 60);
const MAX_MULTIPLIER: f64 = 3.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurgeInfo {
    pub h3_cell_res8: String,
    pub multiplier: f64,
    pub demand_count: u32,
    pub supply_count: u32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SurgeInfo {
    fn default_for(cell_id: &str) -> Self {
        Self {
            h3_cell_res8: cell_id.to_string(),
            multiplier: 1.0,
            demand_count: 0,
            supply_count: 0,
            updated_at: chrono::Utc::now(),
        }
    }
}

/// The piecewise surge schedule over `r = demand/supply` (§4.1 table).
/// Monotonically non-decreasing in `r`, capped at [`MAX_MULTIPLIER`].
pub fn surge_multiplier(demand: u32, supply: u32) -> f64 {
    if supply == 0 {
        return if demand == 0 { 1.0 } else { MAX_MULTIPLIER };
    }
    let r = demand as f64 / supply as f64;
    let multiplier = if r <= 1.0 {
        1.0
    } else if r <= 1.5 {
        1.0 + (r - 1.0) * 0.5
    } else if r <= 2.0 {
        1.25 + (r - 1.5) * 0.75
    } else if r <= 3.0 {
        1.625 + (r - 2.0) * 0.625
    } else {
        (2.25 + (r - 3.0) * 0.25).min(MAX_MULTIPLIER)
    };
    (multiplier.min(MAX_MULTIPLIER) * 100.0).round() / 100.0
}

pub struct SurgeIndex {
    store: Arc<dyn GeoKvStore>,
}

impl SurgeIndex {
    pub fn new(store: Arc<dyn GeoKvStore>) -> Self {
        Self { store }
    }

    pub async fn surge_info(&self, at: &Coordinate) -> Result<SurgeInfo, CoreError> {
        let cell_id = cell(at, CellTier::Surge);
        let key = surge_key(&cell_id);
        match self.store.get(&key).await? {
            Some(blob) => Ok(serde_json::from_str(&blob).unwrap_or_else(|_| SurgeInfo::default_for(&cell_id))),
            None => Ok(SurgeInfo::default_for(&cell_id)),
        }
    }

    pub async fn update_surge_info(
        &self,
        at: &Coordinate,
        demand_count: u32,
        supply_count: u32,
    ) -> Result<SurgeInfo, CoreError> {
        let cell_id = cell(at, CellTier::Surge);
        let info = SurgeInfo {
            h3_cell_res8: cell_id.clone(),
            multiplier: surge_multiplier(demand_count, supply_count),
            demand_count,
            supply_count,
            updated_at: chrono::Utc::now(),
        };
        let blob = serde_json::to_string(&info).map_err(CoreError::internal)?;
        self.store.set_ex(&surge_key(&cell_id), &blob, SURGE_TTL).await?;
        Ok(info)
    }
}

fn surge_key(cell_id: &str) -> String {
    format!("h3:surge:{cell_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supply_zero_demand_zero_is_baseline() {
        assert_eq!(surge_multiplier(0, 0), 1.0);
    }

    #[test]
    fn supply_zero_any_demand_is_capped() {
        assert_eq!(surge_multiplier(5, 0), 3.0);
    }

    #[test]
    fn ratio_at_or_below_one_is_baseline() {
        assert_eq!(surge_multiplier(10, 10), 1.0);
        assert_eq!(surge_multiplier(5, 10), 1.0);
    }

    #[test]
    fn ratio_two_matches_the_schedule() {
        // r = 2.0 -> 1.25 + 0.5*0.75 = 1.625
        assert_eq!(surge_multiplier(20, 10), 1.625);
    }

    #[test]
    fn multiplier_never_exceeds_cap() {
        assert_eq!(surge_multiplier(1000, 1), 3.0);
    }

    #[test]
    fn multiplier_is_monotonic_in_ratio() {
        let ratios = [(5, 10), (10, 10), (12, 10), (15, 10), (18, 10), (20, 10), (25, 10), (40, 10)];
        let mut last = 0.0;
        for (demand, supply) in ratios {
            let m = surge_multiplier(demand, supply);
            assert!(m >= last, "multiplier decreased at demand={demand} supply={supply}");
            last = m;
        }
    }
}
