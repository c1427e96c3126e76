//! Deterministic hexagonal cell indexing (§4.1 "Hierarchical cells").
//!
//! Built on `h3o`, the same crate the pack's ride-hailing simulation reaches
//! for to turn a coordinate into a `CellIndex` and to walk a grid disk.

use {h3o::Resolution, ride_core::Coordinate};

/// The four resolutions this index operates at, named by what they're used
/// for rather than by their numeric H3 level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellTier {
    /// ~175m edge. Driver-location matching.
    Matching,
    /// ~460m edge. Surge pricing.
    Surge,
    /// ~1.2km edge. Demand heatmap.
    Demand,
    /// ~3.2km edge. City-level aggregation.
    City,
}

impl CellTier {
    fn resolution(self) -> Resolution {
        match self {
            CellTier::Matching => Resolution::Nine,
            CellTier::Surge => Resolution::Eight,
            CellTier::Demand => Resolution::Seven,
            CellTier::City => Resolution::Six,
        }
    }
}

/// Maps a coordinate to the hex-string cell id used as a KV key suffix at
/// the given tier's resolution.
pub fn cell(coordinate: &Coordinate, tier: CellTier) -> String {
    let point = h3o::LatLng::new(coordinate.lat, coordinate.lng)
        .expect("Coordinate is already range-validated");
    point.to_cell(tier.resolution()).to_string()
}

/// Parses a previously-produced cell id back into its geometric centre.
pub fn cell_center(cell_id: &str) -> Option<(f64, f64)> {
    let index: h3o::CellIndex = cell_id.parse().ok()?;
    let center = h3o::LatLng::from(index);
    Some((center.lat(), center.lng()))
}

/// The cells within `k` hops of `cell_id` on the hexagonal grid, inclusive
/// of `cell_id` itself (§4.1 demand heatmap: "k-ring of radius 3").
pub fn k_ring(cell_id: &str, k: u32) -> Vec<String> {
    let Ok(index) = cell_id.parse::<h3o::CellIndex>() else {
        return Vec::new();
    };
    index
        .grid_disk::<Vec<_>>(k)
        .into_iter()
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn cell_is_deterministic() {
        let c = coord(37.7749, -122.4194);
        assert_eq!(cell(&c, CellTier::Matching), cell(&c, CellTier::Matching));
    }

    #[test]
    fn coarser_tiers_produce_different_cells() {
        let c = coord(37.7749, -122.4194);
        assert_ne!(cell(&c, CellTier::Matching), cell(&c, CellTier::Surge));
        assert_ne!(cell(&c, CellTier::Surge), cell(&c, CellTier::Demand));
        assert_ne!(cell(&c, CellTier::Demand), cell(&c, CellTier::City));
    }

    #[test]
    fn k_ring_includes_origin_and_grows_with_k() {
        let c = coord(37.7749, -122.4194);
        let origin = cell(&c, CellTier::Demand);
        let ring0 = k_ring(&origin, 0);
        assert_eq!(ring0, vec![origin.clone()]);
        let ring3 = k_ring(&origin, 3);
        assert!(ring3.contains(&origin));
        assert!(ring3.len() > ring0.len());
    }
}
