//! Prometheus metrics endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::error::Result;
use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    update_metrics_from_state(&state).await;

    let output = metrics::encode_metrics()?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        output,
    ))
}

/// Refresh point-in-time gauges from AppState before scraping
async fn update_metrics_from_state(state: &AppState) {
    metrics::CONNECTIONS_ACTIVE.set(state.connections.len() as i64);
    metrics::USERS_REGISTERED.set(state.registry.len().await as i64);
}
