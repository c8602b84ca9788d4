use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;

/// Binds `addr` and serves `/healthz` (always 200 once the controller is
/// up) and `/metrics` (Prometheus text exposition) until the process exits.
pub async fn serve(addr: &str, prometheus: PrometheusHandle) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::new(prometheus));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "health and metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler(State(prometheus): State<Arc<PrometheusHandle>>) -> String {
    prometheus.render()
}
