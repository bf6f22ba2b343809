//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Gateway status response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealthResponse {
    pub status: &'static str,
    pub has_key: bool,
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Gateway status - is an upstream credential configured?
async fn api_health(State(state): State<Arc<ApiState>>) -> Json<ApiHealthResponse> {
    Json(ApiHealthResponse {
        status: "ok",
        has_key: state.gateway.has_credential(),
    })
}

/// Build health router (liveness only, no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build the `/api/health` router
pub fn api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .with_state(state)
}
