//! `{id, type, source, timestamp, data}` domain event envelope (§4.5).

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl DomainEvent {
    /// `subject = source.event_type`, e.g. `negotiation.started`.
    pub fn new(source: &str, event_type: &str, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            source: source.to_owned(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn subject(&self) -> String {
        format!("{}.{}", self.source, self.event_type)
    }
}

/// Event subjects named verbatim in §6.
pub mod subjects {
    pub const NEGOTIATION_STARTED: &str = "negotiation.started";
    pub const NEGOTIATION_OFFER_NEW: &str = "negotiation.offer.new";
    pub const NEGOTIATION_OFFER_ACCEPTED: &str = "negotiation.offer.accepted";
    pub const NEGOTIATION_OFFER_REJECTED: &str = "negotiation.offer.rejected";
    pub const NEGOTIATION_CANCELLED: &str = "negotiation.cancelled";
    pub const NEGOTIATION_EXPIRED: &str = "negotiation.expired";
    pub const RIDES_COMPLETED: &str = "rides.completed";
    pub const PAYMENTS_COMPLETED: &str = "payments.completed";
    pub const PAYMENTS_REFUNDED: &str = "payments.refunded";
}
