//! OpenAPI document, served at `/openapi.json` with Swagger UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::health::health,
        super::handlers::completions::complete,
        super::handlers::models::list_models,
        super::handlers::models::get_model,
        super::handlers::admin::update_model,
    ),
    components(schemas(
        super::handlers::health::HealthBody,
        crate::domain::canonical::CanonicalRequest,
        crate::domain::canonical::Message,
        crate::domain::canonical::MessageContent,
        crate::domain::canonical::ContentItem,
        crate::domain::canonical::ImageUrl,
        crate::domain::canonical::ResponseFormat,
        crate::domain::canonical::Role,
        crate::domain::model::ModelPatch,
        crate::domain::model::Capabilities,
        crate::domain::model::Pricing,
        crate::domain::model::ParameterSchema,
        crate::domain::model::ModelStatus,
    )),
    tags((name = "llm-gateway-proxy", description = "Unified LLM provider proxy"))
)]
pub struct ApiDoc;
