//! The negotiation state machine itself (§4.2).

use {
    crate::collaborators::{Geography, Pricing},
    bigdecimal::BigDecimal,
    chrono::{Duration as ChronoDuration, Utc},
    ride_core::{CoreError, Coordinate, Money},
    ride_database::{
        negotiation::{NewOffer, NewSession, Offer, OfferStatus, Session, SessionStatus},
        Postgres,
    },
    ride_events::{event::subjects, DomainEvent, EventBus, NegotiationRooms},
    std::sync::Arc,
    uuid::Uuid,
};

pub struct StartSessionRequest {
    pub rider_id: Uuid,
    pub pickup: Coordinate,
    pub pickup_addr: Option<String>,
    pub dropoff: Coordinate,
    pub dropoff_addr: Option<String>,
    pub ride_type_id: Option<Uuid>,
    pub currency: String,
    pub initial_offer: Option<BigDecimal>,
}

pub struct SubmitOfferRequest {
    pub driver_id: Uuid,
    pub offered_price: BigDecimal,
    pub currency: String,
    pub driver_lat: Option<f64>,
    pub driver_lng: Option<f64>,
    pub estimated_pickup_time: Option<i32>,
}

pub struct DriverInfo {
    pub rating: Option<f64>,
    pub total_rides: Option<i32>,
    pub vehicle_model: Option<String>,
    pub vehicle_color: Option<String>,
}

pub struct NegotiationService {
    db: Postgres,
    bus: Arc<dyn EventBus>,
    rooms: NegotiationRooms,
    geography: Arc<dyn Geography>,
    pricing: Arc<dyn Pricing>,
}

impl NegotiationService {
    pub fn new(
        db: Postgres,
        bus: Arc<dyn EventBus>,
        rooms: NegotiationRooms,
        geography: Arc<dyn Geography>,
        pricing: Arc<dyn Pricing>,
    ) -> Self {
        Self { db, bus, rooms, geography, pricing }
    }

    /// Lets a transport adapter join the room for a session (§4.5): whole
    /// -room broadcasts, plus messages addressed to one driver.
    pub fn subscribe_room(&self, session_id: Uuid) -> tokio::sync::broadcast::Receiver<ride_events::room::RoomMessage> {
        self.rooms.subscribe(session_id)
    }

    /// §4.2 "Start session".
    pub async fn start_session(&self, req: StartSessionRequest) -> Result<Session, CoreError> {
        let mut conn = self.db.pool.acquire().await?;

        if self
            .db
            .active_session_for_rider(&mut conn, req.rider_id)
            .await?
            .is_some()
        {
            return Err(CoreError::bad_request(
                "rider already has an active negotiation session",
            ));
        }

        // Geography resolution failures are tolerated as an empty
        // resolution (§4.2 step 2).
        let resolution = self
            .geography
            .resolve(&req.pickup)
            .await
            .unwrap_or_default();

        // Pricing failures are never recovered (§9).
        let estimate = self
            .pricing
            .estimate_fare(&req.pickup, &req.dropoff, req.ride_type_id)
            .await?;

        let settings = self
            .db
            .negotiation_settings(
                &mut conn,
                resolution.country_id,
                resolution.region_id,
                resolution.city_id,
            )
            .await?;

        if !settings.negotiation_enabled {
            return Err(CoreError::bad_request(
                "negotiation is disabled for this jurisdiction",
            ));
        }

        let estimate_money = Money::from(estimate.amount.clone());
        let fair_price_min = estimate_money.scaled(settings.min_price_multiplier).0;
        let fair_price_max = estimate_money.scaled(settings.max_price_multiplier).0;

        let initial_offer = req.initial_offer.ok_or_else(|| {
            CoreError::bad_request("an initial offer is required to start a negotiation session")
        })?;
        validate_price_bounds(&initial_offer, &fair_price_min, &fair_price_max)?;

        let new_session = NewSession {
            rider_id: req.rider_id,
            pickup_lat: req.pickup.lat,
            pickup_lng: req.pickup.lng,
            pickup_addr: req.pickup_addr,
            dropoff_lat: req.dropoff.lat,
            dropoff_lng: req.dropoff.lng,
            dropoff_addr: req.dropoff_addr,
            country_id: resolution.country_id,
            region_id: resolution.region_id,
            city_id: resolution.city_id,
            pickup_zone_id: resolution.zone_id,
            dropoff_zone_id: None,
            ride_type_id: req.ride_type_id,
            currency: req.currency,
            estimated_distance: estimate.distance_km,
            estimated_duration: estimate.duration_minutes,
            estimated_fare: estimate.amount.clone(),
            fair_price_min,
            fair_price_max,
            system_suggested_price: estimate.amount,
            rider_initial_offer: Some(initial_offer),
            expires_at: Utc::now() + ChronoDuration::seconds(settings.session_timeout_seconds as i64),
        };
        let session = self.db.insert_session(&mut conn, &new_session).await?;

        self.publish_to_room(subjects::NEGOTIATION_STARTED, &session, None)
            .await;
        Ok(session)
    }

    /// §4.2 "Submit offer".
    pub async fn submit_offer(
        &self,
        session_id: Uuid,
        req: SubmitOfferRequest,
        driver_info: DriverInfo,
    ) -> Result<Offer, CoreError> {
        let mut conn = self.db.pool.acquire().await?;
        let session = self.active_session(&mut conn, session_id).await?;

        let settings = self
            .db
            .negotiation_settings(&mut conn, session.country_id, session.region_id, session.city_id)
            .await?;

        if let (Some(min_rating), Some(rating)) = (settings.min_driver_rating, driver_info.rating) {
            if rating < min_rating {
                return Err(CoreError::bad_request("driver rating below jurisdiction minimum"));
            }
        }
        if let (Some(min_rides), Some(total_rides)) = (settings.min_driver_rides, driver_info.total_rides) {
            if total_rides < min_rides {
                return Err(CoreError::bad_request(
                    "driver total rides below jurisdiction minimum",
                ));
            }
        }

        let active_offers = self
            .db
            .active_offer_count_for_driver(&mut conn, req.driver_id)
            .await?;
        if active_offers >= settings.max_active_sessions_per_driver as i64 {
            return Err(CoreError::bad_request(
                "driver has too many active negotiation offers",
            ));
        }

        let offer_count = self.db.offer_count_for_session(&mut conn, session_id).await?;
        if offer_count >= settings.max_offers_per_session as i64 {
            return Err(CoreError::bad_request(
                "session has reached its maximum number of offers",
            ));
        }

        validate_price_bounds(&req.offered_price, &session.fair_price_min, &session.fair_price_max)?;

        let new_offer = NewOffer {
            session_id,
            driver_id: req.driver_id,
            offered_price: req.offered_price,
            currency: req.currency,
            driver_lat: req.driver_lat,
            driver_lng: req.driver_lng,
            estimated_pickup_time: req.estimated_pickup_time,
            driver_rating: driver_info.rating.and_then(|r| BigDecimal::try_from(r).ok()),
            driver_total_rides: driver_info.total_rides,
            vehicle_model: driver_info.vehicle_model,
            vehicle_color: driver_info.vehicle_color,
            is_counter_offer: false,
        };
        let offer = self.db.insert_offer(&mut conn, &new_offer).await?;
        self.publish_to_room(subjects::NEGOTIATION_OFFER_NEW, &session, Some(&offer))
            .await;
        Ok(offer)
    }

    /// §4.2 "Submit counter-offer (expansion)".
    pub async fn submit_counter_offer(
        &self,
        session_id: Uuid,
        offer_id: Uuid,
        rider_id: Uuid,
        new_price: BigDecimal,
    ) -> Result<Offer, CoreError> {
        let mut conn = self.db.pool.acquire().await?;
        let session = self.active_session(&mut conn, session_id).await?;
        if session.rider_id != rider_id {
            return Err(CoreError::forbidden("session belongs to another rider"));
        }

        let rejected = self
            .db
            .offer_by_id(&mut conn, offer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("offer not found"))?;
        if rejected.session_id != session_id {
            return Err(CoreError::bad_request("offer does not belong to this session"));
        }
        if rejected.status != OfferStatus::Rejected {
            return Err(CoreError::bad_request(
                "a counter-offer can only follow a rejected offer",
            ));
        }

        let settings = self
            .db
            .negotiation_settings(&mut conn, session.country_id, session.region_id, session.city_id)
            .await?;
        let counter_offers = self
            .db
            .counter_offer_count_for_session(&mut conn, session_id)
            .await?;
        if counter_offers >= settings.max_counter_offers as i64 {
            return Err(CoreError::bad_request(
                "session has reached its maximum number of counter-offers",
            ));
        }

        validate_price_bounds(&new_price, &session.fair_price_min, &session.fair_price_max)?;

        let new_offer = NewOffer {
            session_id,
            driver_id: rejected.driver_id,
            offered_price: new_price,
            currency: session.currency.clone(),
            driver_lat: rejected.driver_lat,
            driver_lng: rejected.driver_lng,
            estimated_pickup_time: rejected.estimated_pickup_time,
            driver_rating: rejected.driver_rating,
            driver_total_rides: rejected.driver_total_rides,
            vehicle_model: rejected.vehicle_model.clone(),
            vehicle_color: rejected.vehicle_color.clone(),
            is_counter_offer: true,
        };
        let offer = self.db.insert_offer(&mut conn, &new_offer).await?;
        // §4.5: counter-offers are delivered only to the addressed driver.
        self.publish_to_driver(
            subjects::NEGOTIATION_OFFER_NEW,
            &session,
            &offer,
            offer.driver_id,
        )
        .await;
        Ok(offer)
    }

    /// §4.2 "Accept offer".
    pub async fn accept_offer(
        &self,
        session_id: Uuid,
        offer_id: Uuid,
        rider_id: Uuid,
    ) -> Result<Session, CoreError> {
        let mut conn = self.db.pool.acquire().await?;
        let session = self
            .db
            .session_by_id(&mut conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("negotiation session not found"))?;
        if session.rider_id != rider_id {
            return Err(CoreError::unauthorized("session belongs to another rider"));
        }
        if session.status != SessionStatus::Active {
            return Err(CoreError::bad_request("negotiation session is not active"));
        }

        let offer = self
            .db
            .offer_by_id(&mut conn, offer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("offer not found"))?;
        if offer.session_id != session_id {
            return Err(CoreError::bad_request("offer does not belong to this session"));
        }
        if offer.status != OfferStatus::Pending {
            return Err(CoreError::bad_request("offer is not pending"));
        }

        let mut tx = self.db.pool.begin().await?;
        let accepted = self
            .db
            .accept_offer_atomically(&mut tx, session_id, offer_id, &offer.offered_price)
            .await?;
        if !accepted {
            tx.rollback().await?;
            return Err(CoreError::bad_request(
                "offer was already accepted or the session already completed",
            ));
        }
        tx.commit().await?;

        let mut conn = self.db.pool.acquire().await?;
        let completed = self
            .db
            .session_by_id(&mut conn, session_id)
            .await?
            .ok_or_else(|| CoreError::internal(anyhow::anyhow!("session vanished after commit")))?;

        // §4.5: every driver whose pending offer got rejected as a side
        // effect of this acceptance hears about it individually, not via
        // the whole-room broadcast below.
        let siblings = self.db.offers_for_session(&mut conn, session_id).await?;
        for sibling in siblings.iter().filter(|o| o.id != offer_id && o.status == OfferStatus::Rejected) {
            self.publish_to_driver(
                subjects::NEGOTIATION_OFFER_REJECTED,
                &completed,
                sibling,
                sibling.driver_id,
            )
            .await;
        }

        self.publish_to_room(subjects::NEGOTIATION_OFFER_ACCEPTED, &completed, Some(&offer))
            .await;
        self.rooms.close(session_id);
        Ok(completed)
    }

    /// §4.2 "Cancel session".
    pub async fn cancel_session(&self, session_id: Uuid, rider_id: Uuid) -> Result<(), CoreError> {
        let mut conn = self.db.pool.acquire().await?;
        let session = self
            .db
            .session_by_id(&mut conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("negotiation session not found"))?;
        if session.rider_id != rider_id {
            return Err(CoreError::unauthorized("session belongs to another rider"));
        }
        if session.status != SessionStatus::Active {
            return Err(CoreError::bad_request("negotiation session is not active"));
        }
        let rows = self.db.cancel_session(&mut conn, session_id).await?;
        if rows == 0 {
            return Err(CoreError::bad_request("negotiation session is not active"));
        }
        self.publish_to_room(subjects::NEGOTIATION_CANCELLED, &session, None)
            .await;
        self.rooms.close(session_id);
        Ok(())
    }

    /// §4.2 "Expire sweep". Returns the number of sessions transitioned.
    pub async fn expire_stale(&self) -> Result<u32, CoreError> {
        let mut conn = self.db.pool.acquire().await?;
        let stale = self.db.expired_active_sessions(&mut conn).await?;
        let mut expired_count = 0;
        for session in stale {
            match self.db.mark_session_expired(&mut conn, session.id).await {
                Ok(rows) if rows == 1 => {
                    expired_count += 1;
                    self.publish_to_room(subjects::NEGOTIATION_EXPIRED, &session, None)
                        .await;
                    self.rooms.close(session.id);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(session_id = %session.id, ?err, "failed to expire stale negotiation session");
                }
            }
        }
        Ok(expired_count)
    }

    async fn active_session(
        &self,
        conn: &mut sqlx::PgConnection,
        session_id: Uuid,
    ) -> Result<Session, CoreError> {
        let session = self
            .db
            .session_by_id(conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("negotiation session not found"))?;
        if session.status != SessionStatus::Active {
            return Err(CoreError::bad_request("negotiation session is not active"));
        }
        if Utc::now() > session.expires_at {
            return Err(CoreError::bad_request("negotiation session has expired"));
        }
        Ok(session)
    }

    fn event_for(subject: &str, session: &Session, offer: Option<&Offer>) -> DomainEvent {
        let event_type = subject.strip_prefix("negotiation.").unwrap_or(subject);
        let data = serde_json::json!({
            "session_id": session.id,
            "rider_id": session.rider_id,
            "accepted_price": session.accepted_price,
            "offer": offer.map(|o| serde_json::json!({
                "offer_id": o.id,
                "driver_id": o.driver_id,
                "offered_price": o.offered_price,
            })),
        });
        DomainEvent::new("negotiation", event_type, data)
    }

    /// Publishes to the bus and broadcasts to every party in the session's
    /// room (§4.5 "Session events broadcast to the whole room").
    async fn publish_to_room(&self, subject: &str, session: &Session, offer: Option<&Offer>) {
        let event = Self::event_for(subject, session, offer);
        self.rooms.broadcast_to_room(session.id, event.clone());
        self.bus.publish(subject, event).await;
    }

    /// Publishes to the bus and delivers only to `driver_id` in the room
    /// (§4.5: offer-rejection and counter-offer events are addressed to one
    /// driver, not the whole room).
    async fn publish_to_driver(&self, subject: &str, session: &Session, offer: &Offer, driver_id: Uuid) {
        let event = Self::event_for(subject, session, Some(offer));
        self.rooms.send_to_driver(session.id, driver_id, event.clone());
        self.bus.publish(subject, event).await;
    }
}

fn validate_price_bounds(
    price: &BigDecimal,
    min: &BigDecimal,
    max: &BigDecimal,
) -> Result<(), CoreError> {
    if price < min {
        return Err(CoreError::bad_request(format!(
            "offered price {} is below minimum {}",
            Money::from(price.clone()),
            Money::from(min.clone()),
        )));
    }
    if price > max {
        return Err(CoreError::bad_request(format!(
            "offered price {} exceeds maximum {}",
            Money::from(price.clone()),
            Money::from(max.clone()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::collaborators::{FareEstimate, Geography, GeographyResolution, Pricing},
        ride_events::InMemoryEventBus,
        sqlx::PgPool,
        std::str::FromStr,
    };

    #[test]
    fn price_within_bounds_is_accepted() {
        let min = BigDecimal::from_str("9.00").unwrap();
        let max = BigDecimal::from_str("15.00").unwrap();
        let price = BigDecimal::from_str("12.00").unwrap();
        assert!(validate_price_bounds(&price, &min, &max).is_ok());
    }

    #[test]
    fn price_below_minimum_is_rejected_with_exact_message() {
        let min = BigDecimal::from_str("9.00").unwrap();
        let max = BigDecimal::from_str("15.00").unwrap();
        let price = BigDecimal::from_str("8.50").unwrap();
        let err = validate_price_bounds(&price, &min, &max).unwrap_err();
        assert_eq!(
            err.message,
            "offered price 8.50 is below minimum 9.00"
        );
    }

    #[test]
    fn price_above_maximum_is_rejected_with_exact_message() {
        let min = BigDecimal::from_str("9.00").unwrap();
        let max = BigDecimal::from_str("15.00").unwrap();
        let price = BigDecimal::from_str("15.01").unwrap();
        let err = validate_price_bounds(&price, &min, &max).unwrap_err();
        assert_eq!(
            err.message,
            "offered price 15.01 exceeds maximum 15.00"
        );
    }

    struct FixedGeography;

    #[async_trait::async_trait]
    impl Geography for FixedGeography {
        async fn resolve(&self, _at: &Coordinate) -> Result<GeographyResolution, CoreError> {
            Ok(GeographyResolution::default())
        }
    }

    struct FixedPricing(BigDecimal);

    #[async_trait::async_trait]
    impl Pricing for FixedPricing {
        async fn estimate_fare(
            &self,
            _pickup: &Coordinate,
            _dropoff: &Coordinate,
            _ride_type_id: Option<Uuid>,
        ) -> Result<FareEstimate, CoreError> {
            Ok(FareEstimate {
                amount: self.0.clone(),
                currency: "USD".to_string(),
                distance_km: BigDecimal::from_str("5.00").unwrap(),
                duration_minutes: BigDecimal::from_str("12.00").unwrap(),
            })
        }
    }

    async fn service() -> NegotiationService {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        NegotiationService::new(
            Postgres::from_pool(pool),
            Arc::new(InMemoryEventBus::new()),
            NegotiationRooms::new(),
            Arc::new(FixedGeography),
            Arc::new(FixedPricing(BigDecimal::from_str("10.00").unwrap())),
        )
    }

    fn rider() -> StartSessionRequest {
        StartSessionRequest {
            rider_id: Uuid::new_v4(),
            pickup: Coordinate::new(37.7749, -122.4194).unwrap(),
            pickup_addr: None,
            dropoff: Coordinate::new(37.8044, -122.2712).unwrap(),
            dropoff_addr: None,
            ride_type_id: None,
            currency: "USD".to_string(),
            initial_offer: Some(BigDecimal::from_str("11.00").unwrap()),
        }
    }

    /// A rider's initial offer within the fair-price band starts an active
    /// session that a matching driver offer can then be accepted into,
    /// completing the session atomically.
    #[tokio::test]
    #[ignore]
    async fn session_completes_once_a_pending_offer_is_accepted() {
        let svc = service().await;
        let session = svc.start_session(rider()).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);

        let offer = svc
            .submit_offer(
                session.id,
                SubmitOfferRequest {
                    driver_id: Uuid::new_v4(),
                    offered_price: BigDecimal::from_str("11.00").unwrap(),
                    currency: "USD".to_string(),
                    driver_lat: Some(37.78),
                    driver_lng: Some(-122.41),
                    estimated_pickup_time: Some(180),
                },
                DriverInfo {
                    rating: Some(4.8),
                    total_rides: Some(200),
                    vehicle_model: Some("Camry".to_string()),
                    vehicle_color: Some("Black".to_string()),
                },
            )
            .await
            .unwrap();

        let completed = svc
            .accept_offer(session.id, offer.id, session.rider_id)
            .await
            .unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
        assert_eq!(completed.accepted_price, Some(offer.offered_price));
    }

    /// An offer outside the session's fair-price band is rejected before it
    /// ever reaches the offers table.
    #[tokio::test]
    #[ignore]
    async fn offer_outside_fair_price_band_is_rejected() {
        let svc = service().await;
        let session = svc.start_session(rider()).await.unwrap();

        let err = svc
            .submit_offer(
                session.id,
                SubmitOfferRequest {
                    driver_id: Uuid::new_v4(),
                    offered_price: BigDecimal::from_str("999.00").unwrap(),
                    currency: "USD".to_string(),
                    driver_lat: None,
                    driver_lng: None,
                    estimated_pickup_time: None,
                },
                DriverInfo {
                    rating: None,
                    total_rides: None,
                    vehicle_model: None,
                    vehicle_color: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    /// The expiry sweep transitions sessions past their `expires_at` to
    /// `Expired` and leaves unrelated active sessions untouched.
    #[tokio::test]
    #[ignore]
    async fn expire_stale_transitions_only_sessions_past_their_deadline() {
        let svc = service().await;
        let session = svc.start_session(rider()).await.unwrap();

        let mut conn = svc.db.pool.acquire().await.unwrap();
        sqlx::query("UPDATE negotiation_sessions SET expires_at = now() - interval '1 minute' WHERE id = $1")
            .bind(session.id)
            .execute(&mut *conn)
            .await
            .unwrap();

        let count = svc.expire_stale().await.unwrap();
        assert_eq!(count, 1);

        let reloaded = svc
            .db
            .session_by_id(&mut conn, session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, SessionStatus::Expired);
    }
}
