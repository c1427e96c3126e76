//! `payments` table (§3 Payment).

use {
    crate::{PgTransaction, Postgres},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    sqlx::{postgres::PgRow, FromRow, PgConnection, Row},
    uuid::Uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    Wallet,
    Stripe,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Stripe => "stripe",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Payment {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub external_payment_id: Option<String>,
    pub external_charge_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Payment {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let method: String = row.try_get("payment_method")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            ride_id: row.try_get("ride_id")?,
            rider_id: row.try_get("rider_id")?,
            driver_id: row.try_get("driver_id")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            payment_method: if method == "stripe" {
                PaymentMethod::Stripe
            } else {
                PaymentMethod::Wallet
            },
            status: PaymentStatus::from_str(&status),
            external_payment_id: row.try_get("external_payment_id")?,
            external_charge_id: row.try_get("external_charge_id")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Postgres {
    /// Idempotency guard for `ProcessPaymentWithWallet`/`ProcessStripePayment`
    /// (§4.3 step 1: "at most one completed payment per ride_id", §8).
    pub async fn completed_payment_for_ride(
        &self,
        ex: &mut PgConnection,
        ride_id: Uuid,
    ) -> sqlx::Result<Option<Payment>> {
        crate::count_query("completed_payment_for_ride");
        const QUERY: &str =
            "SELECT * FROM payments WHERE ride_id = $1 AND status = 'completed'";
        sqlx::query_as(QUERY).bind(ride_id).fetch_optional(ex).await
    }

    pub async fn payment_by_id(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
    ) -> sqlx::Result<Option<Payment>> {
        crate::count_query("payment_by_id");
        const QUERY: &str = "SELECT * FROM payments WHERE id = $1";
        sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_payment(
        &self,
        tx: &mut PgTransaction<'_>,
        ride_id: Uuid,
        rider_id: Uuid,
        driver_id: Uuid,
        amount: &BigDecimal,
        currency: &str,
        payment_method: PaymentMethod,
        status: PaymentStatus,
        external_payment_id: Option<&str>,
        external_charge_id: Option<&str>,
        metadata: &serde_json::Value,
    ) -> sqlx::Result<Uuid> {
        crate::count_query("insert_payment");
        const QUERY: &str = r#"
INSERT INTO payments (
    id, ride_id, rider_id, driver_id, amount, currency, payment_method, status,
    external_payment_id, external_charge_id, metadata, created_at, updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), now())
        "#;
        let id = Uuid::new_v4();
        sqlx::query(QUERY)
            .bind(id)
            .bind(ride_id)
            .bind(rider_id)
            .bind(driver_id)
            .bind(amount)
            .bind(currency)
            .bind(payment_method.as_str())
            .bind(status.as_str())
            .bind(external_payment_id)
            .bind(external_charge_id)
            .bind(metadata)
            .execute(&mut **tx)
            .await?;
        Ok(id)
    }

    pub async fn update_payment_status(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
        status: PaymentStatus,
    ) -> sqlx::Result<()> {
        crate::count_query("update_payment_status");
        const QUERY: &str =
            "UPDATE payments SET status = $1, updated_at = now() WHERE id = $2";
        sqlx::query(QUERY)
            .bind(status.as_str())
            .bind(id)
            .execute(ex)
            .await?;
        Ok(())
    }

    pub async fn set_external_charge_id(
        &self,
        ex: &mut PgConnection,
        id: Uuid,
        external_charge_id: &str,
    ) -> sqlx::Result<()> {
        crate::count_query("set_external_charge_id");
        const QUERY: &str =
            "UPDATE payments SET external_charge_id = $1, updated_at = now() WHERE id = $2";
        sqlx::query(QUERY)
            .bind(external_charge_id)
            .bind(id)
            .execute(ex)
            .await?;
        Ok(())
    }

    pub async fn payment_by_external_payment_id(
        &self,
        ex: &mut PgConnection,
        external_payment_id: &str,
    ) -> sqlx::Result<Option<Payment>> {
        crate::count_query("payment_by_external_payment_id");
        const QUERY: &str = "SELECT * FROM payments WHERE external_payment_id = $1";
        sqlx::query_as(QUERY)
            .bind(external_payment_id)
            .fetch_optional(ex)
            .await
    }
}
