//! Default [`Geography`]/[`Pricing`] collaborators the coordinator wires
//! into [`ride_negotiation::NegotiationService`] and
//! [`ride_types::RideTypeService`] absent a dedicated jurisdiction or
//! pricing service to call out to. Both boundaries are trait objects
//! precisely so a real deployment can swap these for HTTP-backed
//! implementations without touching either service.

use {
    async_trait::async_trait,
    bigdecimal::BigDecimal,
    ride_core::{CoreError, Coordinate, Geography, GeographyResolution},
    ride_negotiation::collaborators::{FareEstimate, Pricing},
    std::str::FromStr,
    uuid::Uuid,
};

/// Resolves no jurisdiction at all, so every lookup falls through to the
/// global ride-type tier (§4.4 "Regional fallback cascade") and negotiation
/// proceeds without a region-specific fair-price policy.
pub struct NoopGeography;

#[async_trait]
impl Geography for NoopGeography {
    async fn resolve(&self, _at: &Coordinate) -> Result<GeographyResolution, CoreError> {
        Ok(GeographyResolution::default())
    }
}

/// Flat per-kilometer pricing: a base fare plus a distance-proportional
/// component, the same shape the fair-price band in
/// `NegotiationService::start_session` is checked against (§4.2 step 3).
pub struct DistancePricing {
    pub base_fare: BigDecimal,
    pub per_km_rate: BigDecimal,
}

impl Default for DistancePricing {
    fn default() -> Self {
        Self {
            base_fare: BigDecimal::from_str("3.00").expect("valid decimal"),
            per_km_rate: BigDecimal::from_str("1.50").expect("valid decimal"),
        }
    }
}

#[async_trait]
impl Pricing for DistancePricing {
    async fn estimate_fare(
        &self,
        pickup: &Coordinate,
        dropoff: &Coordinate,
        _ride_type_id: Option<Uuid>,
    ) -> Result<FareEstimate, CoreError> {
        let distance_km = pickup.haversine_km(dropoff);
        let duration_minutes = ride_core::eta_minutes(distance_km);
        let distance = BigDecimal::from_str(&format!("{:.3}", distance_km))
            .map_err(|err| CoreError::internal(anyhow::anyhow!(err)))?;
        let amount = &self.base_fare + &self.per_km_rate * &distance;
        Ok(FareEstimate {
            amount,
            currency: "USD".to_string(),
            distance_km: distance,
            duration_minutes: BigDecimal::from(duration_minutes),
        })
    }
}
