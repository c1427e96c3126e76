//! Process configuration, mirroring the teacher's `autopilot::arguments`
//! shape: a flat `clap::Parser` struct, `env` fallthrough on every flag.

use std::{net::SocketAddr, time::Duration};

#[derive(clap::Parser)]
pub struct Arguments {
    /// Url of the Postgres database backing wallets, payments, negotiation
    /// sessions/offers and the ride-type catalog.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: String,

    /// Url of the Redis instance backing the spatial driver index. When
    /// unset the coordinator runs against an in-memory KV store instead,
    /// which is only suitable for a single-process deployment.
    #[clap(long, env)]
    pub redis_url: Option<String>,

    /// Base url of the external payment processor's HTTP API.
    #[clap(long, env, default_value = "https://api.stripe.com")]
    pub payment_processor_url: String,

    /// API key presented to the payment processor.
    #[clap(long, env, default_value = "")]
    pub payment_processor_api_key: String,

    /// Shared secret used to verify processor webhook signatures. Absent a
    /// secret, webhooks are trusted without verification (dev-only, §4.3).
    #[clap(long, env)]
    pub webhook_secret: Option<String>,

    /// Address the health/metrics server listens on.
    #[clap(long, env, default_value = "0.0.0.0:9090")]
    pub metrics_address: SocketAddr,

    /// How often the LocationBuffer flushes staged driver locations to the
    /// geo-index KV (§5 "Staleness window").
    #[clap(
        long,
        env,
        default_value = "2s",
        value_parser = humantime::parse_duration,
    )]
    pub location_flush_interval: Duration,

    /// Maximum number of staged locations before a flush is triggered early.
    #[clap(long, env, default_value = "500")]
    pub location_buffer_max_size: usize,

    /// How often the negotiation expiry sweeper runs.
    #[clap(
        long,
        env,
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub negotiation_sweep_interval: Duration,
}
