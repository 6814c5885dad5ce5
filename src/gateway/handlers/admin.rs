//! `PUT /v1/admin/models/{id}` — admin-only model patch.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::core_types::ModelId;
use crate::domain::model::ModelPatch;
use crate::error::envelope;
use crate::gateway::{extract_request_id, require_admin, state::AppState};

#[utoipa::path(
    put,
    path = "/v1/admin/models/{id}",
    request_body = ModelPatch,
    responses((status = 200, description = "Updated model record"), (status = 403), (status = 404))
)]
pub async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: axum::extract::Request,
) -> Response {
    let request_id = extract_request_id(request.extensions());
    if let Err(e) = require_admin(request.headers(), &state.config.admin_api_key, &state.config.credential_prefix) {
        return envelope(&e, &request_id);
    }

    let body = request.into_body();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => return envelope(&crate::error::AppError::BadRequest(format!("failed to read body: {e}")), &request_id),
    };
    let patch: ModelPatch = match serde_json::from_slice(&bytes) {
        Ok(p) => p,
        Err(e) => return envelope(&crate::error::AppError::BadRequest(format!("invalid patch body: {e}")), &request_id),
    };

    match state.models.update(&ModelId::from(id), patch).await {
        Ok(updated) => Json(updated).into_response(),
        Err(crate::catalogue::CatalogueError::NotFound) => crate::error::not_found("model not found", &request_id),
        Err(e) => envelope(&crate::error::AppError::Internal(e.to_string()), &request_id),
    }
}
