//! `ride_types` / `country_ride_types` / `city_ride_types` tables
//! (§3 Ride Type, §4.4 GetAvailableRideTypes).

use {
    crate::Postgres,
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    sqlx::{postgres::PgRow, FromRow, PgConnection, Row},
    uuid::Uuid,
};

#[derive(Clone, Debug)]
pub struct RideType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub base_fare: BigDecimal,
    pub per_km_rate: BigDecimal,
    pub per_minute_rate: BigDecimal,
    pub capacity: i32,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// The tier's own `CityRideType`/`CountryRideType.sort_order`, distinct
    /// from `sort_order` above (§3). `None` for the global tier, which has
    /// no join table to carry one.
    pub tier_sort_order: Option<i32>,
}

impl FromRow<'_, PgRow> for RideType {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            icon: row.try_get("icon")?,
            base_fare: row.try_get("base_fare")?,
            per_km_rate: row.try_get("per_km_rate")?,
            per_minute_rate: row.try_get("per_minute_rate")?,
            capacity: row.try_get("capacity")?,
            sort_order: row.try_get("sort_order")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            tier_sort_order: row.try_get("tier_sort_order")?,
        })
    }
}

impl Postgres {
    /// Three-tier cascade: ride types enabled for `city_id` if that row
    /// exists, else those enabled for `country_id`, else every globally
    /// active ride type. Soft-deleted (`is_active = false`) rows never
    /// surface regardless of tier (§4.4 edge case: soft-delete semantics).
    pub async fn available_ride_types(
        &self,
        ex: &mut PgConnection,
        country_id: Uuid,
        city_id: Option<Uuid>,
    ) -> sqlx::Result<Vec<RideType>> {
        crate::count_query("available_ride_types");

        if let Some(city_id) = city_id {
            const CITY_QUERY: &str = r#"
SELECT rt.*, cr.sort_order AS tier_sort_order FROM ride_types rt
JOIN city_ride_types cr ON cr.ride_type_id = rt.id
WHERE cr.city_id = $1 AND cr.is_active AND rt.is_active
ORDER BY cr.sort_order ASC, rt.name ASC
            "#;
            let rows: Vec<RideType> = sqlx::query_as(CITY_QUERY)
                .bind(city_id)
                .fetch_all(&mut *ex)
                .await?;
            if !rows.is_empty() {
                return Ok(rows);
            }
        }

        const COUNTRY_QUERY: &str = r#"
SELECT rt.*, cr.sort_order AS tier_sort_order FROM ride_types rt
JOIN country_ride_types cr ON cr.ride_type_id = rt.id
WHERE cr.country_id = $1 AND cr.is_active AND rt.is_active
ORDER BY cr.sort_order ASC, rt.name ASC
        "#;
        let rows: Vec<RideType> = sqlx::query_as(COUNTRY_QUERY)
            .bind(country_id)
            .fetch_all(&mut *ex)
            .await?;
        if !rows.is_empty() {
            return Ok(rows);
        }

        const GLOBAL_QUERY: &str = r#"
SELECT *, NULL::int4 AS tier_sort_order FROM ride_types
WHERE is_active
ORDER BY sort_order ASC, name ASC
        "#;
        sqlx::query_as(GLOBAL_QUERY).fetch_all(ex).await
    }

    pub async fn ride_type_by_id(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
    ) -> sqlx::Result<Option<RideType>> {
        crate::count_query("ride_type_by_id");
        const QUERY: &str =
            "SELECT *, NULL::int4 AS tier_sort_order FROM ride_types WHERE id = $1 AND is_active";
        sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
    }
}
