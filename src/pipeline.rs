//! Request Pipeline (C8): orchestrates C1-C7 for a single request, including
//! bounded retry and an at-most-one fallback recursion.
//!
//! State machine per spec.md §4.8: Received -> Authenticated -> Resolved ->
//! Admitted -> Validated -> Priced -> Dispatching(attempt=k) -> Settled ->
//! Logged, with Rejected (before Admitted) and Failed (after Admitted) as
//! terminal failure states.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::billing::BillingLedger;
use crate::catalogue::CatalogueStore;
use crate::core_types::{CredentialKey, ModelId};
use crate::counters::CounterStore;
use crate::domain::canonical::CanonicalRequest;
use crate::domain::model::{Capabilities, Provider};
use crate::domain::{CredentialRecord, ModelRecord, RequestLogEntry, RequestStatus, RetryAttempt, RetryStatus};
use crate::error::AppError;
use crate::model_manager::ModelManager;
use crate::providers::ProviderAdapter;
use crate::rate_limiter::RateLimiter;
use crate::validator;

fn internal<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Internal(e.to_string())
}

pub struct RequestPipeline {
    catalogue: Arc<dyn CatalogueStore>,
    rate_limiter: RateLimiter,
    billing: BillingLedger,
    models: ModelManager,
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

enum PricedOutcome {
    Proceed(CanonicalRequest, Decimal),
    InsufficientBalance,
}

impl RequestPipeline {
    pub fn new(
        catalogue: Arc<dyn CatalogueStore>,
        counters: Arc<dyn CounterStore>,
        adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(counters),
            billing: BillingLedger::new(catalogue.clone()),
            models: ModelManager::new(catalogue.clone()),
            catalogue,
            adapters,
        }
    }

    /// Entry point: `Received -> Authenticated`.
    pub async fn handle(
        &self,
        request: CanonicalRequest,
        credential_key: &CredentialKey,
        request_id: &str,
    ) -> Result<CanonicalResponseResult, AppError> {
        let credential = self
            .catalogue
            .find_credential(credential_key)
            .await
            .map_err(internal)?
            .ok_or_else(|| AppError::AuthError("unknown credential".to_string()))?;

        if !credential.is_active() {
            return Err(AppError::Forbidden("credential is disabled".to_string()));
        }

        self.resolve_and_dispatch(request, &credential, request_id, false)
            .await
            .map(CanonicalResponseResult)
    }

    /// `Authenticated -> Resolved -> Admitted`, then the validate/price/
    /// dispatch chain, with exactly one release per successful admission and
    /// at most one fallback recursion (P3, P5).
    fn resolve_and_dispatch<'a>(
        &'a self,
        request: CanonicalRequest,
        credential: &'a CredentialRecord,
        request_id: &'a str,
        is_fallback: bool,
    ) -> Pin<Box<dyn Future<Output = Result<crate::domain::canonical::CanonicalResponse, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let model_id = ModelId::from(request.model.clone());
            let model = self
                .models
                .get(&model_id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::BadRequest(format!("unknown model '{model_id}'")))?;

            self.rate_limiter
                .admit(&credential.api_key, &credential.rate_limits)
                .await
                .map_err(|e| AppError::RateLimited(e.to_string()))?;

            debug!(request_id, model = %model_id, "admitted");

            let outcome = self.validate_and_price(request.clone(), credential, &model).await;
            match outcome {
                Ok(PricedOutcome::Proceed(validated, cost)) => {
                    let result = self.dispatch(validated, credential, &model, cost, request_id).await;
                    self.rate_limiter.release(&credential.api_key).await;
                    result
                }
                Ok(PricedOutcome::InsufficientBalance) => {
                    self.rate_limiter.release(&credential.api_key).await;

                    if !is_fallback && credential.retry_config.fallback_to_lower_tier {
                        let required = required_capabilities(&request);
                        if let Some(lower) = self
                            .models
                            .find_lower_tier(model.capability_level, required)
                            .await
                            .map_err(internal)?
                        {
                            info!(request_id, from = %model_id, to = %lower.model_id, "falling back to lower-tier model");
                            let mut fallback_request = request;
                            fallback_request.model = lower.model_id.to_string();
                            return self
                                .resolve_and_dispatch(fallback_request, credential, request_id, true)
                                .await;
                        }
                    }

                    warn!(request_id, model = %model_id, "insufficient balance, no fallback available");
                    self.log_failure(request_id, credential, &model, &request, "insufficient balance").await;
                    Err(AppError::InsufficientBalance("insufficient balance".to_string()))
                }
                Err(e) => {
                    self.rate_limiter.release(&credential.api_key).await;
                    self.log_failure(request_id, credential, &model, &request, &e.to_string()).await;
                    Err(e)
                }
            }
        })
    }

    /// `Admitted -> Validated -> Priced`.
    async fn validate_and_price(
        &self,
        request: CanonicalRequest,
        credential: &CredentialRecord,
        model: &ModelRecord,
    ) -> Result<PricedOutcome, AppError> {
        let validated = validator::validate(request, model).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let cost = self.billing.estimate(&validated, model);
        let sufficient = self
            .billing
            .check_balance(&credential.api_key, cost)
            .await
            .map_err(internal)?;
        if !sufficient {
            return Ok(PricedOutcome::InsufficientBalance);
        }
        Ok(PricedOutcome::Proceed(validated, cost))
    }

    /// `Priced -> Dispatching(attempt=k) -> Settled -> Logged`.
    async fn dispatch(
        &self,
        request: CanonicalRequest,
        credential: &CredentialRecord,
        model: &ModelRecord,
        _estimated_cost: Decimal,
        request_id: &str,
    ) -> Result<crate::domain::canonical::CanonicalResponse, AppError> {
        let adapter = self
            .adapters
            .get(&model.provider)
            .ok_or_else(|| AppError::Internal(format!("no adapter configured for provider {:?}", model.provider)))?;

        let max_retries = credential.retry_config.max_retries.max(1);
        let mut attempts = Vec::new();
        let mut attempt: u32 = 1;

        loop {
            let timestamp = Utc::now();
            match adapter.complete(&request).await {
                Ok(response) => {
                    attempts.push(RetryAttempt { attempt, timestamp, status: RetryStatus::Success, error: None });

                    let cost = self.billing.finalise(&response.usage, model);
                    self.billing
                        .deduct(&credential.api_key, cost)
                        .await
                        .map_err(internal)?;

                    self.log_success(request_id, credential, model, &request, &response, cost, attempts)
                        .await;

                    info!(request_id, model = %model.model_id, %cost, "request settled");
                    return Ok(response);
                }
                Err(e) => {
                    attempts.push(RetryAttempt {
                        attempt,
                        timestamp,
                        status: RetryStatus::Failed,
                        error: Some(e.to_string()),
                    });

                    if attempt < max_retries {
                        warn!(request_id, attempt, error = %e, "upstream call failed, retrying");
                        if credential.retry_config.retry_delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(credential.retry_config.retry_delay_ms)).await;
                        }
                        attempt += 1;
                        continue;
                    }

                    warn!(request_id, attempt, error = %e, "upstream call exhausted retries");
                    self.log_retry_exhausted(request_id, credential, model, &request, &e.to_string(), attempts)
                        .await;
                    return Err(AppError::UpstreamError(e.to_string()));
                }
            }
        }
    }

    async fn log_success(
        &self,
        request_id: &str,
        credential: &CredentialRecord,
        model: &ModelRecord,
        request: &CanonicalRequest,
        response: &crate::domain::canonical::CanonicalResponse,
        cost: Decimal,
        retry_attempts: Vec<RetryAttempt>,
    ) {
        let entry = RequestLogEntry {
            request_id: request_id.to_string(),
            api_key: credential.api_key.clone(),
            model_id: model.model_id.clone(),
            timestamp: Utc::now(),
            parameters: named_params_as_json(request),
            message_types: message_type_counts(request),
            usage: Some(response.usage.clone()),
            cost: Some(cost),
            status: RequestStatus::Completed,
            retry_attempts,
            error: None,
        };
        if let Err(e) = self.catalogue.insert_request_log(entry).await {
            warn!(request_id, error = %e, "failed to persist request log");
        }
    }

    async fn log_retry_exhausted(
        &self,
        request_id: &str,
        credential: &CredentialRecord,
        model: &ModelRecord,
        request: &CanonicalRequest,
        error: &str,
        retry_attempts: Vec<RetryAttempt>,
    ) {
        let entry = RequestLogEntry {
            request_id: request_id.to_string(),
            api_key: credential.api_key.clone(),
            model_id: model.model_id.clone(),
            timestamp: Utc::now(),
            parameters: named_params_as_json(request),
            message_types: message_type_counts(request),
            usage: None,
            cost: None,
            status: RequestStatus::Failed,
            retry_attempts,
            error: Some(error.to_string()),
        };
        if let Err(e) = self.catalogue.insert_request_log(entry).await {
            warn!(request_id, error = %e, "failed to persist request log");
        }
    }

    async fn log_failure(
        &self,
        request_id: &str,
        credential: &CredentialRecord,
        model: &ModelRecord,
        request: &CanonicalRequest,
        error: &str,
    ) {
        let entry = RequestLogEntry {
            request_id: request_id.to_string(),
            api_key: credential.api_key.clone(),
            model_id: model.model_id.clone(),
            timestamp: Utc::now(),
            parameters: named_params_as_json(request),
            message_types: message_type_counts(request),
            usage: None,
            cost: None,
            status: RequestStatus::Failed,
            retry_attempts: vec![],
            error: Some(error.to_string()),
        };
        if let Err(e) = self.catalogue.insert_request_log(entry).await {
            warn!(request_id, error = %e, "failed to persist request log");
        }
    }
}

/// Wraps the pipeline's successful result so the handler layer can attach
/// response headers without re-threading the whole type through `error.rs`.
pub struct CanonicalResponseResult(pub crate::domain::canonical::CanonicalResponse);

fn required_capabilities(request: &CanonicalRequest) -> Capabilities {
    let has_image = request.messages.iter().any(|m| m.content.has_image());
    Capabilities { text: true, image: has_image, reply: false }
}

fn named_params_as_json(request: &CanonicalRequest) -> HashMap<String, Value> {
    request.named_params()
}

fn message_type_counts(request: &CanonicalRequest) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for m in &request.messages {
        let role = match m.role {
            crate::domain::canonical::Role::System => "system",
            crate::domain::canonical::Role::User => "user",
            crate::domain::canonical::Role::Assistant => "assistant",
            crate::domain::canonical::Role::Function => "function",
        };
        *counts.entry(role.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::memory::InMemoryCatalogue;
    use crate::config::AppConfig;
    use crate::counters::InMemoryCounterStore;
    use crate::domain::canonical::{CanonicalResponse, Choice, Message, MessageContent, Role, Usage};
    use crate::model_manager::ModelManager as ModelManagerForSeed;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubAdapter {
        failures_then_success: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        async fn complete(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, ProviderError> {
            let remaining = self.failures_then_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_then_success.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError("stub upstream failure".to_string()));
            }
            Ok(CanonicalResponse {
                id: "resp-1".to_string(),
                object: "chat.completion".to_string(),
                created: 0,
                model: request.model.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: Message { role: Role::Assistant, content: MessageContent::Text("hi back".to_string()), name: None },
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage { prompt_tokens: 5, completion_tokens: 10, total_tokens: 15 },
                system_fingerprint: None,
            })
        }
    }

    async fn build_pipeline(failures_then_success: u32) -> (RequestPipeline, Arc<InMemoryCatalogue>, AppConfig) {
        let catalogue = Arc::new(InMemoryCatalogue::new());
        let config = AppConfig::from_env().unwrap();
        ModelManagerForSeed::new(catalogue.clone()).seed(&config).await.unwrap();

        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        let stub = Arc::new(StubAdapter { failures_then_success: AtomicU32::new(failures_then_success) });
        adapters.insert(Provider::OpenAi, stub.clone());
        adapters.insert(Provider::Anthropic, stub.clone());
        adapters.insert(Provider::Xai, stub);

        let counters = InMemoryCounterStore::new();
        let pipeline = RequestPipeline::new(catalogue.clone(), counters, adapters);
        (pipeline, catalogue, config)
    }

    fn request_for(model: &str) -> CanonicalRequest {
        CanonicalRequest {
            model: model.to_string(),
            messages: vec![Message { role: Role::User, content: MessageContent::Text("hi".to_string()), name: None }],
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            response_format: None,
            stream: false,
            extra_params: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn happy_path_settles_and_logs() {
        let (pipeline, catalogue, config) = build_pipeline(0).await;
        let key = CredentialKey::from(format!("{}default", config.credential_prefix));

        let result = pipeline.handle(request_for("gpt-4o"), &key, "req-1").await.unwrap();
        assert_eq!(result.0.usage.total_tokens, 15);

        let credential = catalogue.find_credential(&key).await.unwrap().unwrap();
        assert!(credential.balance < Decimal::new(100, 0));

        let txns = catalogue.list_transactions(&key).await.unwrap();
        assert_eq!(txns.len(), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let (pipeline, catalogue, config) = build_pipeline(2).await;
        let key = CredentialKey::from(format!("{}default", config.credential_prefix));

        let result = pipeline.handle(request_for("gpt-4o"), &key, "req-2").await.unwrap();
        assert_eq!(result.0.choices[0].finish_reason.as_deref(), Some("stop"));
        let _ = catalogue;
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_as_bad_request() {
        let (pipeline, _catalogue, config) = build_pipeline(0).await;
        let key = CredentialKey::from(format!("{}default", config.credential_prefix));
        let err = pipeline.handle(request_for("does-not-exist"), &key, "req-3").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_credential_is_rejected_as_auth_error() {
        let (pipeline, _catalogue, _config) = build_pipeline(0).await;
        let key = CredentialKey::from("sk-does-not-exist");
        let err = pipeline.handle(request_for("gpt-4o"), &key, "req-4").await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }
}
