use axum::{Json, extract::State};
use ledgerdesk_api::HealthResponse;

use crate::accounting::Accounting;

/// GET /api/health - server liveness check.
pub async fn health(State(accounting): State<Accounting>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: accounting.cache_backend().to_string(),
    })
}
