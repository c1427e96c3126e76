//! Processor webhook handling (§4.3 "Webhook handling"): signature
//! verification, event classification, and dispatch into payment status
//! transitions.

use {
    crate::service::PaymentsService,
    hmac::{Hmac, Mac},
    ride_core::CoreError,
    ride_database::payments::PaymentStatus,
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, serde::Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, serde::Deserialize)]
pub struct WebhookEventData {
    /// The processor's payment intent or charge id, matched back to
    /// `payments.external_payment_id`/`external_charge_id`.
    pub id: String,
}

/// Verifies `signature` (hex-encoded HMAC-SHA256 over the raw payload) using
/// `secret`. Constant-time by construction: `Mac::verify_slice` rejects in
/// constant time relative to the MAC length.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

impl PaymentsService {
    /// Verifies (when a secret is configured) and dispatches a webhook
    /// payload. Absent a secret, the payload is trusted and a warning is
    /// logged -- dev-only per §4.3.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_hex: Option<&str>,
        webhook_secret: Option<&[u8]>,
    ) -> Result<(), CoreError> {
        match (webhook_secret, signature_hex) {
            (Some(secret), Some(signature_hex)) => {
                if !verify_signature(secret, payload, signature_hex) {
                    return Err(CoreError::bad_request("invalid webhook signature"));
                }
            }
            (Some(_), None) => {
                return Err(CoreError::bad_request("missing webhook signature"));
            }
            (None, _) => {
                tracing::warn!("processing webhook without signature verification: no secret configured");
            }
        }

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|err| CoreError::bad_request(format!("malformed webhook payload: {err}")))?;

        let mut conn = self.db.pool.acquire().await?;
        let payment = self
            .db
            .payment_by_external_payment_id(&mut conn, &event.data.id)
            .await?;

        let Some(payment) = payment else {
            // Unknown external id: accepted as a no-op, same as an unknown
            // event type (§4.3).
            tracing::debug!(external_id = %event.data.id, "webhook references unknown payment");
            return Ok(());
        };

        match event.event_type.as_str() {
            "payment_intent.succeeded" => {
                self.db
                    .update_payment_status(&mut conn, payment.id, PaymentStatus::Completed)
                    .await?;
                self.publish(ride_events::event::subjects::PAYMENTS_COMPLETED, payment.id, payment.ride_id)
                    .await;
            }
            "payment_intent.payment_failed" => {
                self.db
                    .update_payment_status(&mut conn, payment.id, PaymentStatus::Failed)
                    .await?;
            }
            "charge.refunded" => {
                self.db
                    .update_payment_status(&mut conn, payment.id, PaymentStatus::Refunded)
                    .await?;
                self.publish(ride_events::event::subjects::PAYMENTS_REFUNDED, payment.id, payment.ride_id)
                    .await;
            }
            other => {
                tracing::debug!(event_type = other, "ignoring unrecognized webhook event type");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_signature_verifies() {
        let secret = b"whsec_test";
        let payload = b"{\"type\":\"payment_intent.succeeded\"}";
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, payload, &signature));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let secret = b"whsec_test";
        let payload = b"{\"type\":\"payment_intent.succeeded\"}";
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(!verify_signature(secret, b"{\"type\":\"tampered\"}", &signature));
    }

    #[test]
    fn malformed_hex_signature_is_rejected() {
        assert!(!verify_signature(b"secret", b"payload", "not-hex"));
    }
}
