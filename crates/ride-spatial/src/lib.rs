//! Spatial Driver Index (§4.1): location ingest, nearest/availability
//! queries, surge pricing and the demand heatmap, all against a pluggable
//! [`GeoKvStore`] boundary.

pub mod cell;
pub mod demand;
pub mod eta;
pub mod kv;
pub mod location;
mod metrics;
pub mod nearest;
pub mod redis_kv;
pub mod surge;

pub use {
    cell::{cell as cell_id, CellTier},
    demand::{DemandIndex, DemandInfo},
    eta::{ActiveRide, EtaTracker, KvEtaTracker},
    kv::GeoKvStore,
    location::{update_driver_location, DriverLocation, DriverStatus, LocationBuffer, LocationBufferConfig, SpatialIndex},
    nearest::NearbyDriver,
    redis_kv::RedisGeoStore,
    surge::{surge_multiplier, SurgeIndex, SurgeInfo},
};
