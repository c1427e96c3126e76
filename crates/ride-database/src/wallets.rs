//! `wallets` / `wallet_transactions` tables (§3 Wallet, Wallet Transaction).

use {
    crate::{PgTransaction, Postgres},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    sqlx::{PgConnection, postgres::PgRow, FromRow, Row},
    uuid::Uuid,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "credit" => TransactionType::Credit,
            _ => TransactionType::Debit,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Wallet {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            balance: row.try_get("balance")?,
            currency: row.try_get("currency")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub description: String,
    pub reference_type: String,
    pub reference_id: Option<Uuid>,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl Postgres {
    /// Creates a wallet for `user_id` with a zero balance if one doesn't
    /// already exist, and returns it either way. Used by `PayoutToDriver`
    /// (§4.3) to lazily provision the driver's wallet.
    pub async fn ensure_wallet(
        &self,
        ex: &mut PgConnection,
        user_id: Uuid,
        currency: &str,
    ) -> sqlx::Result<Wallet> {
        crate::count_query("ensure_wallet");
        if let Some(wallet) = self.wallet_for_user(ex, user_id).await? {
            return Ok(wallet);
        }
        const INSERT: &str = r#"
INSERT INTO wallets (id, user_id, balance, currency, is_active, created_at, updated_at)
VALUES ($1, $2, 0, $3, true, now(), now())
ON CONFLICT (user_id) DO NOTHING
        "#;
        sqlx::query(INSERT)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(currency)
            .execute(&mut *ex)
            .await?;
        self.wallet_for_user(ex, user_id)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound)
    }

    pub async fn wallet_for_user(
        &self,
        ex: &mut PgConnection,
        user_id: Uuid,
    ) -> sqlx::Result<Option<Wallet>> {
        crate::count_query("wallet_for_user");
        const QUERY: &str = "SELECT * FROM wallets WHERE user_id = $1";
        sqlx::query_as(QUERY).bind(user_id).fetch_optional(ex).await
    }

    /// Locks the wallet row for the duration of the caller's transaction
    /// (§5 "Wallet operations ... MUST occur under a per-wallet database row
    /// lock"). Must be called within an open transaction.
    pub async fn lock_wallet_for_user(
        &self,
        tx: &mut PgTransaction<'_>,
        user_id: Uuid,
    ) -> sqlx::Result<Option<Wallet>> {
        crate::count_query("lock_wallet_for_user");
        const QUERY: &str = "SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE";
        sqlx::query_as(QUERY)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn set_wallet_balance(
        &self,
        tx: &mut PgTransaction<'_>,
        wallet_id: Uuid,
        new_balance: &BigDecimal,
    ) -> sqlx::Result<()> {
        crate::count_query("set_wallet_balance");
        const QUERY: &str = "UPDATE wallets SET balance = $1, updated_at = now() WHERE id = $2";
        sqlx::query(QUERY)
            .bind(new_balance)
            .bind(wallet_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_wallet_transaction(
        &self,
        tx: &mut PgTransaction<'_>,
        wallet_id: Uuid,
        transaction_type: TransactionType,
        amount: &BigDecimal,
        description: &str,
        reference_type: &str,
        reference_id: Option<Uuid>,
        balance_before: &BigDecimal,
        balance_after: &BigDecimal,
    ) -> sqlx::Result<Uuid> {
        crate::count_query("insert_wallet_transaction");
        const QUERY: &str = r#"
INSERT INTO wallet_transactions (
    id, wallet_id, type, amount, description, reference_type, reference_id,
    balance_before, balance_after, created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        "#;
        let id = Uuid::new_v4();
        sqlx::query(QUERY)
            .bind(id)
            .bind(wallet_id)
            .bind(transaction_type.as_str())
            .bind(amount)
            .bind(description)
            .bind(reference_type)
            .bind(reference_id)
            .bind(balance_before)
            .bind(balance_after)
            .execute(&mut **tx)
            .await?;
        Ok(id)
    }

    pub async fn wallet_transactions(
        &self,
        ex: &mut PgConnection,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> sqlx::Result<Vec<WalletTransaction>> {
        crate::count_query("wallet_transactions");
        const QUERY: &str = r#"
SELECT * FROM wallet_transactions
WHERE wallet_id = $1
ORDER BY created_at DESC
LIMIT $2 OFFSET $3
        "#;
        let rows: Vec<PgRow> = sqlx::query(QUERY)
            .bind(wallet_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(ex)
            .await?;
        rows.iter().map(row_to_wallet_transaction).collect()
    }
}

fn row_to_wallet_transaction(row: &PgRow) -> sqlx::Result<WalletTransaction> {
    Ok(WalletTransaction {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        transaction_type: TransactionType::from_str(row.try_get("type")?),
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        reference_type: row.try_get("reference_type")?,
        reference_id: row.try_get("reference_id")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        created_at: row.try_get("created_at")?,
    })
}
