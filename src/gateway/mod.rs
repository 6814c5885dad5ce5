//! HTTP front-end: router, auth extraction, and the ambient middleware
//! (`X-Request-Id`/`X-Process-Time` headers, permissive CORS, OpenAPI docs).

pub mod handlers;
pub mod openapi;
pub mod state;

use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::core_types::{new_request_id, CredentialKey};
use crate::error::AppError;
use state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/v1/chat/completions", axum::routing::post(handlers::completions::complete))
        .route("/v1/models", get(handlers::models::list_models))
        .route("/v1/models/{id}", get(handlers::models::get_model))
        .route("/v1/admin/models/{id}", put(handlers::admin::update_model))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi::ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_metadata_middleware))
        .with_state(state)
}

/// Stamps every response with `X-Request-Id` and `X-Process-Time`, ported
/// from the original's `add_process_time_header` ASGI middleware.
async fn request_metadata_middleware(mut request: Request, next: Next) -> Response {
    let request_id = new_request_id();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let started = Instant::now();
    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", v);
    }
    if let Ok(v) = HeaderValue::from_str(&format!("{elapsed_ms:.2}ms")) {
        headers.insert("x-process-time", v);
    }
    response
}

#[derive(Clone)]
pub struct RequestId(pub String);

pub(crate) fn extract_request_id(request_ext: &axum::http::Extensions) -> String {
    request_ext.get::<RequestId>().map(|r| r.0.clone()).unwrap_or_else(new_request_id)
}

/// Reads the credential from `Authorization: Bearer <key>` and checks the
/// configured prefix (spec.md §6).
pub(crate) fn extract_credential(headers: &HeaderMap, prefix: &str) -> Result<CredentialKey, AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthError("missing Authorization header".to_string()))?;

    let key = header
        .strip_prefix("Bearer ")
        .unwrap_or(header)
        .trim()
        .to_string();

    if !key.starts_with(prefix) {
        return Err(AppError::AuthError(format!("credential must start with '{prefix}'")));
    }

    Ok(CredentialKey::from(key))
}

/// Admin routes additionally require the credential equal the configured
/// admin key (spec.md §6).
pub(crate) fn require_admin(headers: &HeaderMap, admin_key: &str, prefix: &str) -> Result<CredentialKey, AppError> {
    let credential = extract_credential(headers, prefix)?;
    if credential.as_str() != admin_key {
        return Err(AppError::Forbidden("admin credential required".to_string()));
    }
    Ok(credential)
}
