//! Collaborator traits `StartSession` needs but doesn't own the
//! implementation of: resolving a coordinate to a jurisdiction, and pricing
//! a trip (§4.2 "Start session" steps 2-3).
//!
//! `Geography` itself lives in `ride_core` since the ride-type availability
//! cascade needs the same jurisdiction lookup; re-exported here so callers
//! of this crate don't need a second `use`.

use {async_trait::async_trait, bigdecimal::BigDecimal, ride_core::Coordinate, uuid::Uuid};

pub use ride_core::{Geography, GeographyResolution};

#[derive(Clone, Debug)]
pub struct FareEstimate {
    pub amount: BigDecimal,
    pub currency: String,
    pub distance_km: BigDecimal,
    pub duration_minutes: BigDecimal,
}

/// Produces the base fare estimate a negotiation session's fair-price bounds
/// are derived from (§4.2 step 3). Unlike [`Geography`], a failure here is
/// never recovered -- `StartSession` fails outright (§9 "Never recovered").
#[async_trait]
pub trait Pricing: Send + Sync {
    async fn estimate_fare(
        &self,
        pickup: &Coordinate,
        dropoff: &Coordinate,
        ride_type_id: Option<Uuid>,
    ) -> Result<FareEstimate, ride_core::CoreError>;
}
