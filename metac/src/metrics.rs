//! Debug/metrics HTTP server (§6 `--debug-addr`): `/metrics` (Prometheus exposition) and
//! `/healthz`. Ambient observability infrastructure, not a spec feature, so it's carried
//! regardless of the domain Non-goals. The counters themselves live in `metac_core::Metrics`
//! so `metac-runtime` can increment them without depending on this binary crate.
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metac_core::Metrics;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = metrics.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics".to_string());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).into_owned())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "debug/metrics server listening");
    axum::serve(listener, router(metrics)).await
}
