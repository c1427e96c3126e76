//! The jurisdiction-resolution boundary shared by the negotiation session
//! lifecycle and the ride-type availability cascade (§4.2 step 2, §4.4 step
//! 1) -- both need "coordinate -> (country, region, city, zone)" and neither
//! owns how that lookup is actually done (a reverse-geocoding service, a
//! polygon index, ...).

use {crate::types::Coordinate, uuid::Uuid};

#[derive(Clone, Debug, Default)]
pub struct GeographyResolution {
    pub country_id: Option<Uuid>,
    pub region_id: Option<Uuid>,
    pub city_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
}

/// Resolves coordinates to the jurisdiction hierarchy. A resolution failure
/// is tolerated by callers as an empty resolution (§4.2 step 2), so this
/// trait's error type is deliberately left to the implementor.
#[async_trait::async_trait]
pub trait Geography: Send + Sync {
    async fn resolve(&self, at: &Coordinate) -> Result<GeographyResolution, crate::CoreError>;
}
