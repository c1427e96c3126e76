//! Ride-Type Availability Resolver (§4.4): a thin service over the
//! city -> country -> global ride-type cascade the database layer already
//! implements, fronted by a coordinate-to-jurisdiction lookup.

use {
    ride_core::{CoreError, Coordinate, Geography},
    ride_database::{ride_types::RideType, Postgres},
    std::sync::Arc,
    uuid::Uuid,
};

pub struct RideTypeService {
    db: Postgres,
    geography: Arc<dyn Geography>,
}

impl RideTypeService {
    pub fn new(db: Postgres, geography: Arc<dyn Geography>) -> Self {
        Self { db, geography }
    }

    /// §4.4 "GetAvailableRideTypes". A geography-resolution failure (or a
    /// resolution with no country) is tolerated: it just means every tier
    /// above "global" is skipped, same as if the jurisdiction genuinely had
    /// no city/country ride-type rows configured.
    pub async fn available_ride_types(&self, at: &Coordinate) -> Result<Vec<RideType>, CoreError> {
        let resolution = self.geography.resolve(at).await.unwrap_or_default();
        let country_id = resolution.country_id.unwrap_or_else(Uuid::nil);

        let mut conn = self.db.pool.acquire().await?;
        let ride_types = self
            .db
            .available_ride_types(&mut conn, country_id, resolution.city_id)
            .await?;
        Ok(ride_types)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, async_trait::async_trait, ride_core::GeographyResolution, sqlx::PgPool};

    struct UnresolvableGeography;

    #[async_trait]
    impl Geography for UnresolvableGeography {
        async fn resolve(&self, _at: &Coordinate) -> Result<GeographyResolution, CoreError> {
            Err(CoreError::internal(anyhow::anyhow!("geocoder unavailable")))
        }
    }

    /// A resolver outage falls through to the nil-country sentinel rather
    /// than failing the whole lookup, which the cascade then treats like a
    /// jurisdiction with no country-level overrides configured.
    #[tokio::test]
    #[ignore]
    async fn geography_failure_still_returns_the_global_ride_type_tier() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        let service = RideTypeService::new(Postgres::from_pool(pool), Arc::new(UnresolvableGeography));
        let at = Coordinate::new(40.7128, -74.0060).unwrap();
        let ride_types = service.available_ride_types(&at).await.unwrap();
        assert!(ride_types.iter().all(|rt| rt.is_active));
    }
}
