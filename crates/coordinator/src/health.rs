//! Health and metrics endpoints, mirroring the teacher's
//! `LivenessChecking` + `serve_metrics` pair from `autopilot::main`.

use {
    axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router},
    std::{net::SocketAddr, sync::Arc, time::Instant},
};

#[async_trait::async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

pub struct Liveness {
    started_at: Instant,
}

impl Liveness {
    pub fn new() -> Self {
        Self { started_at: Instant::now() }
    }
}

#[async_trait::async_trait]
impl LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        // The coordinator has nothing external to check at startup; once
        // the process is serving requests at all it's alive. A future
        // revision could fold in DB/KV ping results here.
        self.started_at.elapsed().as_secs() < u64::MAX
    }
}

async fn healthz(State(liveness): State<Arc<dyn LivenessChecking>>) -> impl IntoResponse {
    if liveness.is_alive().await {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not alive")
    }
}

async fn metrics() -> impl IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap_or_default();
    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
}

pub async fn serve(addr: SocketAddr, liveness: Arc<dyn LivenessChecking>) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(liveness);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving health and metrics endpoints");
    axum::serve(listener, app).await
}
