//! `GET /v1/models`, `GET /v1/models/{id}`.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::core_types::ModelId;
use crate::error::envelope;
use crate::gateway::{extract_credential, extract_request_id, state::AppState};

#[utoipa::path(get, path = "/v1/models", responses((status = 200, description = "Active model records")))]
pub async fn list_models(State(state): State<AppState>, request: axum::extract::Request) -> Response {
    let request_id = extract_request_id(request.extensions());
    if let Err(e) = extract_credential(request.headers(), &state.config.credential_prefix) {
        return envelope(&e, &request_id);
    }

    match state.models.list_active().await {
        Ok(models) => Json(models).into_response(),
        Err(e) => envelope(&crate::error::AppError::Internal(e.to_string()), &request_id),
    }
}

#[utoipa::path(get, path = "/v1/models/{id}", responses((status = 200, description = "One model record"), (status = 404)))]
pub async fn get_model(State(state): State<AppState>, Path(id): Path<String>, request: axum::extract::Request) -> Response {
    let request_id = extract_request_id(request.extensions());
    if let Err(e) = extract_credential(request.headers(), &state.config.credential_prefix) {
        return envelope(&e, &request_id);
    }

    match state.models.get(&ModelId::from(id)).await {
        Ok(Some(model)) => Json(model).into_response(),
        Ok(None) => crate::error::not_found("model not found", &request_id),
        Err(e) => envelope(&crate::error::AppError::Internal(e.to_string()), &request_id),
    }
}
