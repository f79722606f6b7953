//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connections::ConnectionSetStats;
use crate::relay::BroadcastStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
    pub registry: RegistryHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RegistryHealthResponse {
    pub registered_users: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionSetStats,
    pub registered_users: usize,
    pub broadcast: BroadcastStatsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state.started_at.elapsed().as_secs();

    // Everything is in-memory, so a responding process is a healthy one.
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        connections: ConnectionHealthResponse {
            total: state.connections.len(),
        },
        registry: RegistryHealthResponse {
            registered_users: state.registry.len().await,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.connections.stats(),
        registered_users: state.registry.len().await,
        broadcast: state.broadcaster.stats(),
    })
}
