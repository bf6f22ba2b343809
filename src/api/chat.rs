//! Chat proxy endpoint

use std::sync::Arc;

use axum::{Json, Router, body::Bytes, extract::State, routing::post};

use super::ApiState;
use crate::adapter::NormalizedResponse;
use crate::gateway::GatewayError;

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Forward one chat request upstream
///
/// The body is taken raw so that malformed JSON is reported as a setup
/// error rather than rejected by an extractor.
async fn chat(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<NormalizedResponse>, GatewayError> {
    state.gateway.handle(&body).await.map(Json)
}
