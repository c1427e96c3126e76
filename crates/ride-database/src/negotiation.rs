//! `negotiation_sessions` / `negotiation_offers` / `negotiation_settings`
//! tables (§3 Negotiation Session, Offer, Negotiation Settings).

use {
    crate::{PgTransaction, Postgres},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    sqlx::{postgres::PgRow, FromRow, PgConnection, Row},
    uuid::Uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Expired => "expired",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => SessionStatus::Completed,
            "cancelled" => SessionStatus::Cancelled,
            "expired" => SessionStatus::Expired,
            _ => SessionStatus::Active,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl OfferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Withdrawn => "withdrawn",
            OfferStatus::Expired => "expired",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "accepted" => OfferStatus::Accepted,
            "rejected" => OfferStatus::Rejected,
            "withdrawn" => OfferStatus::Withdrawn,
            "expired" => OfferStatus::Expired,
            _ => OfferStatus::Pending,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub rider_id: Uuid,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_addr: Option<String>,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub dropoff_addr: Option<String>,
    pub country_id: Option<Uuid>,
    pub region_id: Option<Uuid>,
    pub city_id: Option<Uuid>,
    pub pickup_zone_id: Option<Uuid>,
    pub dropoff_zone_id: Option<Uuid>,
    pub ride_type_id: Option<Uuid>,
    pub currency: String,
    pub estimated_distance: BigDecimal,
    pub estimated_duration: BigDecimal,
    pub estimated_fare: BigDecimal,
    pub fair_price_min: BigDecimal,
    pub fair_price_max: BigDecimal,
    pub system_suggested_price: BigDecimal,
    pub rider_initial_offer: Option<BigDecimal>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_addr: Option<String>,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub dropoff_addr: Option<String>,
    pub country_id: Option<Uuid>,
    pub region_id: Option<Uuid>,
    pub city_id: Option<Uuid>,
    pub pickup_zone_id: Option<Uuid>,
    pub dropoff_zone_id: Option<Uuid>,
    pub ride_type_id: Option<Uuid>,
    pub currency: String,
    pub estimated_distance: BigDecimal,
    pub estimated_duration: BigDecimal,
    pub estimated_fare: BigDecimal,
    pub fair_price_min: BigDecimal,
    pub fair_price_max: BigDecimal,
    pub system_suggested_price: BigDecimal,
    pub rider_initial_offer: Option<BigDecimal>,
    pub accepted_price: Option<BigDecimal>,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Session {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            rider_id: row.try_get("rider_id")?,
            pickup_lat: row.try_get("pickup_lat")?,
            pickup_lng: row.try_get("pickup_lng")?,
            pickup_addr: row.try_get("pickup_addr")?,
            dropoff_lat: row.try_get("dropoff_lat")?,
            dropoff_lng: row.try_get("dropoff_lng")?,
            dropoff_addr: row.try_get("dropoff_addr")?,
            country_id: row.try_get("country_id")?,
            region_id: row.try_get("region_id")?,
            city_id: row.try_get("city_id")?,
            pickup_zone_id: row.try_get("pickup_zone_id")?,
            dropoff_zone_id: row.try_get("dropoff_zone_id")?,
            ride_type_id: row.try_get("ride_type_id")?,
            currency: row.try_get("currency")?,
            estimated_distance: row.try_get("estimated_distance")?,
            estimated_duration: row.try_get("estimated_duration")?,
            estimated_fare: row.try_get("estimated_fare")?,
            fair_price_min: row.try_get("fair_price_min")?,
            fair_price_max: row.try_get("fair_price_max")?,
            system_suggested_price: row.try_get("system_suggested_price")?,
            rider_initial_offer: row.try_get("rider_initial_offer")?,
            accepted_price: row.try_get("accepted_price")?,
            status: SessionStatus::from_str(&status),
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewOffer {
    pub session_id: Uuid,
    pub driver_id: Uuid,
    pub offered_price: BigDecimal,
    pub currency: String,
    pub driver_lat: Option<f64>,
    pub driver_lng: Option<f64>,
    pub estimated_pickup_time: Option<i32>,
    pub driver_rating: Option<BigDecimal>,
    pub driver_total_rides: Option<i32>,
    pub vehicle_model: Option<String>,
    pub vehicle_color: Option<String>,
    pub is_counter_offer: bool,
}

#[derive(Clone, Debug)]
pub struct Offer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub driver_id: Uuid,
    pub offered_price: BigDecimal,
    pub currency: String,
    pub driver_lat: Option<f64>,
    pub driver_lng: Option<f64>,
    pub estimated_pickup_time: Option<i32>,
    pub driver_rating: Option<BigDecimal>,
    pub driver_total_rides: Option<i32>,
    pub vehicle_model: Option<String>,
    pub vehicle_color: Option<String>,
    pub status: OfferStatus,
    pub is_counter_offer: bool,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Offer {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            driver_id: row.try_get("driver_id")?,
            offered_price: row.try_get("offered_price")?,
            currency: row.try_get("currency")?,
            driver_lat: row.try_get("driver_lat")?,
            driver_lng: row.try_get("driver_lng")?,
            estimated_pickup_time: row.try_get("estimated_pickup_time")?,
            driver_rating: row.try_get("driver_rating")?,
            driver_total_rides: row.try_get("driver_total_rides")?,
            vehicle_model: row.try_get("vehicle_model")?,
            vehicle_color: row.try_get("vehicle_color")?,
            status: OfferStatus::from_str(&status),
            is_counter_offer: row.try_get("is_counter_offer")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub negotiation_enabled: bool,
    pub session_timeout_seconds: i32,
    pub max_offers_per_session: i32,
    pub max_counter_offers: i32,
    pub offer_timeout_seconds: i32,
    pub min_price_multiplier: f64,
    pub max_price_multiplier: f64,
    pub max_active_sessions_per_driver: i32,
    pub min_driver_rating: Option<f64>,
    pub min_driver_rides: Option<i32>,
}

impl Default for Settings {
    /// Package defaults (§3: "hierarchical fallback to defaults").
    fn default() -> Self {
        Self {
            negotiation_enabled: true,
            session_timeout_seconds: 300,
            max_offers_per_session: 10,
            max_counter_offers: 3,
            offer_timeout_seconds: 60,
            min_price_multiplier: 0.7,
            max_price_multiplier: 1.5,
            max_active_sessions_per_driver: 5,
            min_driver_rating: None,
            min_driver_rides: None,
        }
    }
}

impl FromRow<'_, PgRow> for Settings {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            negotiation_enabled: row.try_get("negotiation_enabled")?,
            session_timeout_seconds: row.try_get("session_timeout_seconds")?,
            max_offers_per_session: row.try_get("max_offers_per_session")?,
            max_counter_offers: row.try_get("max_counter_offers")?,
            offer_timeout_seconds: row.try_get("offer_timeout_seconds")?,
            min_price_multiplier: row.try_get("min_price_multiplier")?,
            max_price_multiplier: row.try_get("max_price_multiplier")?,
            max_active_sessions_per_driver: row.try_get("max_active_sessions_per_driver")?,
            min_driver_rating: row.try_get("min_driver_rating")?,
            min_driver_rides: row.try_get("min_driver_rides")?,
        })
    }
}

impl Postgres {
    pub async fn active_session_for_rider(
        &self,
        ex: &mut PgConnection,
        rider_id: Uuid,
    ) -> sqlx::Result<Option<Session>> {
        crate::count_query("active_session_for_rider");
        const QUERY: &str =
            "SELECT * FROM negotiation_sessions WHERE rider_id = $1 AND status = 'active'";
        sqlx::query_as(QUERY).bind(rider_id).fetch_optional(ex).await
    }

    pub async fn session_by_id(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
    ) -> sqlx::Result<Option<Session>> {
        crate::count_query("session_by_id");
        const QUERY: &str = "SELECT * FROM negotiation_sessions WHERE id = $1";
        sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
    }

    pub async fn insert_session(
        &self,
        ex: &mut PgConnection,
        new: &NewSession,
    ) -> sqlx::Result<Session> {
        crate::count_query("insert_session");
        const QUERY: &str = r#"
INSERT INTO negotiation_sessions (
    id, rider_id, pickup_lat, pickup_lng, pickup_addr, dropoff_lat, dropoff_lng, dropoff_addr,
    country_id, region_id, city_id, pickup_zone_id, dropoff_zone_id, ride_type_id, currency,
    estimated_distance, estimated_duration, estimated_fare, fair_price_min, fair_price_max,
    system_suggested_price, rider_initial_offer, accepted_price, status, expires_at, created_at
)
VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
    $21, $22, NULL, 'active', $23, now()
)
RETURNING *
        "#;
        sqlx::query_as(QUERY)
            .bind(Uuid::new_v4())
            .bind(new.rider_id)
            .bind(new.pickup_lat)
            .bind(new.pickup_lng)
            .bind(&new.pickup_addr)
            .bind(new.dropoff_lat)
            .bind(new.dropoff_lng)
            .bind(&new.dropoff_addr)
            .bind(new.country_id)
            .bind(new.region_id)
            .bind(new.city_id)
            .bind(new.pickup_zone_id)
            .bind(new.dropoff_zone_id)
            .bind(new.ride_type_id)
            .bind(&new.currency)
            .bind(&new.estimated_distance)
            .bind(&new.estimated_duration)
            .bind(&new.estimated_fare)
            .bind(&new.fair_price_min)
            .bind(&new.fair_price_max)
            .bind(&new.system_suggested_price)
            .bind(&new.rider_initial_offer)
            .bind(new.expires_at)
            .fetch_one(ex)
            .await
    }

    pub async fn cancel_session(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
    ) -> sqlx::Result<u64> {
        crate::count_query("cancel_session");
        const QUERY: &str =
            "UPDATE negotiation_sessions SET status = 'cancelled' WHERE id = $1 AND status = 'active'";
        Ok(sqlx::query(QUERY).bind(id).execute(ex).await?.rows_affected())
    }

    /// All active sessions whose `expires_at` is already in the past
    /// (§4.2 "Expire sweep").
    pub async fn expired_active_sessions(
        &self,
        ex: &mut PgConnection,
    ) -> sqlx::Result<Vec<Session>> {
        crate::count_query("expired_active_sessions");
        const QUERY: &str =
            "SELECT * FROM negotiation_sessions WHERE status = 'active' AND expires_at < now()";
        sqlx::query_as(QUERY).fetch_all(ex).await
    }

    pub async fn mark_session_expired(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
    ) -> sqlx::Result<u64> {
        crate::count_query("mark_session_expired");
        const QUERY: &str =
            "UPDATE negotiation_sessions SET status = 'expired' WHERE id = $1 AND status = 'active'";
        Ok(sqlx::query(QUERY).bind(id).execute(ex).await?.rows_affected())
    }

    pub async fn insert_offer(
        &self,
        ex: &mut PgConnection,
        new: &NewOffer,
    ) -> sqlx::Result<Offer> {
        crate::count_query("insert_offer");
        const QUERY: &str = r#"
INSERT INTO negotiation_offers (
    id, session_id, driver_id, offered_price, currency, driver_lat, driver_lng,
    estimated_pickup_time, driver_rating, driver_total_rides, vehicle_model, vehicle_color,
    status, is_counter_offer, created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending', $13, now())
RETURNING *
        "#;
        sqlx::query_as(QUERY)
            .bind(Uuid::new_v4())
            .bind(new.session_id)
            .bind(new.driver_id)
            .bind(&new.offered_price)
            .bind(&new.currency)
            .bind(new.driver_lat)
            .bind(new.driver_lng)
            .bind(new.estimated_pickup_time)
            .bind(&new.driver_rating)
            .bind(new.driver_total_rides)
            .bind(&new.vehicle_model)
            .bind(&new.vehicle_color)
            .bind(new.is_counter_offer)
            .fetch_one(ex)
            .await
    }

    pub async fn offer_by_id(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
    ) -> sqlx::Result<Option<Offer>> {
        crate::count_query("offer_by_id");
        const QUERY: &str = "SELECT * FROM negotiation_offers WHERE id = $1";
        sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
    }

    pub async fn offers_for_session(
        &self,
        ex: &mut PgConnection,
        session_id: Uuid,
    ) -> sqlx::Result<Vec<Offer>> {
        crate::count_query("offers_for_session");
        const QUERY: &str =
            "SELECT * FROM negotiation_offers WHERE session_id = $1 ORDER BY created_at ASC";
        sqlx::query_as(QUERY).bind(session_id).fetch_all(ex).await
    }

    /// Counts every offer (initial and counter) ever recorded against
    /// `session_id`, regardless of status (§3 `max_offers_per_session`).
    pub async fn offer_count_for_session(
        &self,
        ex: &mut PgConnection,
        session_id: Uuid,
    ) -> sqlx::Result<i64> {
        crate::count_query("offer_count_for_session");
        const QUERY: &str = "SELECT count(*) FROM negotiation_offers WHERE session_id = $1";
        sqlx::query_scalar(QUERY).bind(session_id).fetch_one(ex).await
    }

    /// Counts counter-offers (`is_counter_offer`) recorded against
    /// `session_id` (§3 `max_counter_offers`).
    pub async fn counter_offer_count_for_session(
        &self,
        ex: &mut PgConnection,
        session_id: Uuid,
    ) -> sqlx::Result<i64> {
        crate::count_query("counter_offer_count_for_session");
        const QUERY: &str =
            "SELECT count(*) FROM negotiation_offers WHERE session_id = $1 AND is_counter_offer";
        sqlx::query_scalar(QUERY).bind(session_id).fetch_one(ex).await
    }

    /// Counts `driver_id`'s pending offers across every non-terminal
    /// session platform-wide (§4.2 SubmitOffer step 4).
    pub async fn active_offer_count_for_driver(
        &self,
        ex: &mut PgConnection,
        driver_id: Uuid,
    ) -> sqlx::Result<i64> {
        crate::count_query("active_offer_count_for_driver");
        const QUERY: &str = r#"
SELECT count(*) FROM negotiation_offers o
JOIN negotiation_sessions s ON s.id = o.session_id
WHERE o.driver_id = $1 AND o.status = 'pending' AND s.status = 'active'
        "#;
        sqlx::query_scalar(QUERY).bind(driver_id).fetch_one(ex).await
    }

    /// The atomic offer-acceptance transition (§4.2 AcceptOffer step 3, §9):
    /// chosen offer -> accepted, sibling pending offers -> rejected, session
    /// -> completed with `accepted_price`. Uses optimistic `WHERE status =
    /// 'pending'`/`'active'` guards followed by a row-count check, so a
    /// concurrent accept loses cleanly instead of double-completing.
    pub async fn accept_offer_atomically(
        &self,
        tx: &mut PgTransaction<'_>,
        session_id: Uuid,
        offer_id: Uuid,
        offered_price: &BigDecimal,
    ) -> sqlx::Result<bool> {
        crate::count_query("accept_offer_atomically");

        const ACCEPT_OFFER: &str = r#"
UPDATE negotiation_offers SET status = 'accepted'
WHERE id = $1 AND session_id = $2 AND status = 'pending'
        "#;
        let accepted = sqlx::query(ACCEPT_OFFER)
            .bind(offer_id)
            .bind(session_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();
        if accepted != 1 {
            return Ok(false);
        }

        const REJECT_SIBLINGS: &str = r#"
UPDATE negotiation_offers SET status = 'rejected'
WHERE session_id = $1 AND id != $2 AND status = 'pending'
        "#;
        sqlx::query(REJECT_SIBLINGS)
            .bind(session_id)
            .bind(offer_id)
            .execute(&mut **tx)
            .await?;

        const COMPLETE_SESSION: &str = r#"
UPDATE negotiation_sessions SET status = 'completed', accepted_price = $1
WHERE id = $2 AND status = 'active'
        "#;
        let completed = sqlx::query(COMPLETE_SESSION)
            .bind(offered_price)
            .bind(session_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(completed == 1)
    }

    /// Hierarchical settings lookup: city row, else region row, else country
    /// row, else package defaults (§3 Negotiation Settings, §4.2 step 4).
    pub async fn negotiation_settings(
        &self,
        ex: &mut PgConnection,
        country_id: Option<Uuid>,
        region_id: Option<Uuid>,
        city_id: Option<Uuid>,
    ) -> sqlx::Result<Settings> {
        crate::count_query("negotiation_settings");
        const QUERY: &str = r#"
SELECT * FROM negotiation_settings
WHERE (city_id IS NOT DISTINCT FROM $1 AND city_id IS NOT NULL)
   OR (region_id IS NOT DISTINCT FROM $2 AND region_id IS NOT NULL AND city_id IS NULL)
   OR (country_id IS NOT DISTINCT FROM $3 AND region_id IS NULL AND city_id IS NULL)
ORDER BY
    (city_id IS NOT DISTINCT FROM $1 AND city_id IS NOT NULL) DESC,
    (region_id IS NOT DISTINCT FROM $2 AND region_id IS NOT NULL) DESC
LIMIT 1
        "#;
        let row: Option<Settings> = sqlx::query_as(QUERY)
            .bind(city_id)
            .bind(region_id)
            .bind(country_id)
            .fetch_optional(ex)
            .await?;
        Ok(row.unwrap_or_default())
    }
}
