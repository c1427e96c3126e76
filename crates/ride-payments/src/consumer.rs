//! Subscribes to `rides.completed` and records driver earnings off it,
//! keeping payments decoupled from ride state (§9 "Cross-subsystem
//! coupling").

use {
    crate::service::PaymentsService, bigdecimal::BigDecimal, futures::StreamExt, ride_events::EventBus,
    std::{str::FromStr, sync::Arc}, tracing::Instrument, uuid::Uuid,
};

#[derive(serde::Deserialize)]
struct RideCompleted {
    ride_id: Uuid,
    driver_id: Uuid,
    fare_amount: String,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

pub fn spawn(service: Arc<PaymentsService>, bus: Arc<dyn EventBus>) {
    tokio::spawn(
        async move {
            let mut events = bus.subscribe(
                ride_events::event::subjects::RIDES_COMPLETED,
                "ride-payments",
            );
            while let Some(next) = events.next().await {
                let event = match next {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(?err, "lagged on rides.completed subscription");
                        continue;
                    }
                };
                let payload: RideCompleted = match serde_json::from_value(event.data.clone()) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(?err, "malformed rides.completed payload");
                        continue;
                    }
                };
                let fare_amount = match BigDecimal::from_str(&payload.fare_amount) {
                    Ok(amount) => amount,
                    Err(err) => {
                        tracing::warn!(?err, "malformed fare_amount in rides.completed payload");
                        continue;
                    }
                };
                if let Err(err) = service
                    .record_driver_earning_from_ride_completed(
                        payload.ride_id,
                        payload.driver_id,
                        fare_amount,
                        &payload.currency,
                    )
                    .await
                {
                    tracing::error!(?err, ride_id = %payload.ride_id, "failed to record driver earning");
                }
            }
        }
        .in_current_span(),
    );
}
