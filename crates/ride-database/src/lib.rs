//! Repository layer for the relational store that backs wallets, payments,
//! negotiation sessions/offers/settings and the ride-type catalog (§3).
//!
//! Design, mirrored from the pattern this workspace's services use for
//! their own Postgres access:
//!
//! Functions that need more than one statement to succeed or fail together
//! take `&mut PgTransaction` to make that explicit and push the `commit()`
//! call to the caller. Functions that run a single statement take anything
//! that implements `sqlx::Executor` so callers can use them standalone or as
//! part of a larger transaction. We call that parameter `ex`.
//!
//! None of the SQL here is checked against a live database at compile time
//! (`sqlx::query`/`query_as`, not the `query!` macros) so the crate builds
//! without a `DATABASE_URL`; the tradeoff is that a typo in a column name
//! only surfaces at runtime.

pub mod negotiation;
pub mod payments;
pub mod ride_types;
pub mod wallets;

use {
    sqlx::PgPool,
    std::time::Duration,
    tracing::Instrument,
};

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

struct Metrics {
    /// Number of database queries executed, by repository function.
    database_queries: prometheus::IntCounterVec,
}

impl Metrics {
    fn new() -> Self {
        let database_queries = prometheus::IntCounterVec::new(
            prometheus::Opts::new(
                "ride_database_queries",
                "Number of database queries executed, by repository function.",
            ),
            &["function"],
        )
        .expect("valid metric");
        prometheus::register(Box::new(database_queries.clone()))
            .expect("metric not already registered");
        Self { database_queries }
    }
}

#[derive(Clone)]
pub struct Postgres {
    pub pool: PgPool,
}

impl Postgres {
    pub async fn new(url: &str) -> sqlx::Result<Self> {
        let pool = PgPool::connect(url).await?;
        let db = Self { pool };
        db.start_metrics_job();
        Ok(db)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn start_metrics_job(&self) {
        let pool = self.pool.clone();
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(5));
                loop {
                    ticker.tick().await;
                    let idle = pool.num_idle();
                    let active = pool.size() as usize - idle;
                    tracing::debug!(idle, active, "database pool utilization");
                }
            }
            .in_current_span(),
        );
    }
}

fn metrics() -> &'static Metrics {
    static METRICS: std::sync::OnceLock<Metrics> = std::sync::OnceLock::new();
    METRICS.get_or_init(Metrics::new)
}

pub(crate) fn count_query(function: &'static str) {
    metrics()
        .database_queries
        .with_label_values(&[function])
        .inc();
}
