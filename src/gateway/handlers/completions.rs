//! `POST /v1/chat/completions` — the core pipeline entry point.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::domain::canonical::CanonicalRequest;
use crate::error::envelope;
use crate::gateway::{extract_credential, extract_request_id, state::AppState};

#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    request_body = CanonicalRequest,
    responses((status = 200, description = "Completion produced"))
)]
pub async fn complete(State(state): State<AppState>, request: Request) -> Response {
    let request_id = extract_request_id(request.extensions());
    let (parts, body) = request.into_parts();

    let credential = match extract_credential(&parts.headers, &state.config.credential_prefix) {
        Ok(c) => c,
        Err(e) => return envelope(&e, &request_id),
    };

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => return envelope(&crate::error::AppError::BadRequest(format!("failed to read body: {e}")), &request_id),
    };

    let canonical: CanonicalRequest = match serde_json::from_slice(&bytes) {
        Ok(r) => r,
        Err(e) => return envelope(&crate::error::AppError::BadRequest(format!("invalid request body: {e}")), &request_id),
    };

    match state.pipeline.handle(canonical, &credential, &request_id).await {
        Ok(result) => Json(result.0).into_response(),
        Err(e) => envelope(&e, &request_id),
    }
}
