//! `GET /health` — unauthenticated liveness probe.

use axum::response::{IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthBody {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    git_hash: &'static str,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthBody)))]
pub async fn health() -> impl IntoResponse {
    Json(HealthBody { status: "ok", timestamp: chrono::Utc::now(), git_hash: env!("GIT_HASH") })
}
