//! Integration tests driving the full pipeline against in-memory stores and
//! a stub provider adapter (no network), covering the six scenarios of
//! spec.md §8 (see SPEC_FULL.md §12 for the scenario -> test mapping).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use llm_gateway_proxy::catalogue::memory::InMemoryCatalogue;
use llm_gateway_proxy::catalogue::CatalogueStore;
use llm_gateway_proxy::config::AppConfig;
use llm_gateway_proxy::core_types::CredentialKey;
use llm_gateway_proxy::counters::InMemoryCounterStore;
use llm_gateway_proxy::domain::canonical::{CanonicalRequest, CanonicalResponse, Choice, Message, MessageContent, Role, Usage};
use llm_gateway_proxy::domain::model::Provider;
use llm_gateway_proxy::domain::{CredentialRecord, CredentialStatus, RateLimits, RetryConfig, Tier};
use llm_gateway_proxy::error::AppError;
use llm_gateway_proxy::model_manager::ModelManager;
use llm_gateway_proxy::pipeline::RequestPipeline;
use llm_gateway_proxy::providers::{ProviderAdapter, ProviderError};

/// Always succeeds, unless `block` is held, in which case it waits on a
/// oneshot-style notify to model a slow/blocking upstream for the
/// concurrency-cap scenario. Fails exactly `fail_count` times before
/// succeeding, for the retry scenario.
struct StubAdapter {
    fail_count: AtomicU32,
    block: Option<Arc<tokio::sync::Notify>>,
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    async fn complete(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, ProviderError> {
        if let Some(notify) = &self.block {
            notify.notified().await;
        }

        let remaining = self.fail_count.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError("stub upstream failure".to_string()));
        }

        Ok(CanonicalResponse {
            id: "resp".to_string(),
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

fn credential(key: &str, balance: Decimal, rate_limits: RateLimits, retry: RetryConfig) -> CredentialRecord {
    CredentialRecord {
        api_key: CredentialKey::from(key),
        tier: Tier::Normal,
        balance,
        rate_limits,
        retry_config: retry,
        status: CredentialStatus::Active,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

fn default_rate_limits() -> RateLimits {
    RateLimits { requests_per_minute: 60, requests_per_day: 10_000, requests_per_month: 100_000, concurrent_requests: 10 }
}

fn default_retry() -> RetryConfig {
    RetryConfig { max_retries: 3, retry_delay_ms: 0, fallback_to_lower_tier: true }
}

async fn pipeline_with(
    catalogue: Arc<InMemoryCatalogue>,
    fail_count: u32,
    block: Option<Arc<tokio::sync::Notify>>,
) -> RequestPipeline {
    let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
    let stub = Arc::new(StubAdapter { fail_count: AtomicU32::new(fail_count), block });
    adapters.insert(Provider::OpenAi, stub.clone());
    adapters.insert(Provider::Anthropic, stub.clone());
    adapters.insert(Provider::Xai, stub);

    RequestPipeline::new(catalogue, InMemoryCounterStore::new(), adapters)
}

#[tokio::test]
async fn happy_path() {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    let config = AppConfig::from_env().unwrap();
    ModelManager::new(catalogue.clone()).seed(&config).await.unwrap();

    let key = CredentialKey::from("sk-default-happy");
    catalogue
        .insert_credential(credential("sk-default-happy", Decimal::new(100, 0), default_rate_limits(), default_retry()))
        .await
        .unwrap();

    let pipeline = pipeline_with(catalogue.clone(), 0, None).await;

    let result = pipeline.handle(request_for("gpt-4o"), &key, "req-happy").await.unwrap();
    assert_eq!(result.0.usage.total_tokens, 15);

    // 5/1e6*15 + 10/1e6*50 = 5.75e-4
    let credential_after = catalogue.find_credential(&key).await.unwrap().unwrap();
    assert_eq!(credential_after.balance, Decimal::new(100, 0) - Decimal::new(575, 6));

    let txns = catalogue.list_transactions(&key).await.unwrap();
    assert_eq!(txns.len(), 1);
}

#[tokio::test]
async fn per_minute_rate_limit() {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    let config = AppConfig::from_env().unwrap();
    ModelManager::new(catalogue.clone()).seed(&config).await.unwrap();

    let key = CredentialKey::from("sk-rate-limited");
    let limits = RateLimits { requests_per_minute: 1, requests_per_day: 10_000, requests_per_month: 100_000, concurrent_requests: 10 };
    catalogue
        .insert_credential(credential("sk-rate-limited", Decimal::new(100, 0), limits, default_retry()))
        .await
        .unwrap();

    let pipeline = pipeline_with(catalogue.clone(), 0, None).await;

    pipeline.handle(request_for("gpt-4o"), &key, "req-1").await.unwrap();
    let err = pipeline.handle(request_for("gpt-4o"), &key, "req-2").await.unwrap_err();
    assert!(matches!(err, AppError::RateLimited(_)));
}

#[tokio::test]
async fn concurrency_cap() {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    let config = AppConfig::from_env().unwrap();
    ModelManager::new(catalogue.clone()).seed(&config).await.unwrap();

    let key = CredentialKey::from("sk-concurrency");
    let limits = RateLimits { requests_per_minute: 1_000, requests_per_day: 10_000, requests_per_month: 100_000, concurrent_requests: 2 };
    catalogue
        .insert_credential(credential("sk-concurrency", Decimal::new(1000, 0), limits, default_retry()))
        .await
        .unwrap();

    let notify = Arc::new(tokio::sync::Notify::new());
    let pipeline = Arc::new(pipeline_with(catalogue.clone(), 0, Some(notify.clone())).await);

    let h1 = {
        let pipeline = pipeline.clone();
        let key = key.clone();
        tokio::spawn(async move { pipeline.handle(request_for("gpt-4o"), &key, "req-1").await })
    };
    let h2 = {
        let pipeline = pipeline.clone();
        let key = key.clone();
        tokio::spawn(async move { pipeline.handle(request_for("gpt-4o"), &key, "req-2").await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Both slots are held by h1/h2 (still blocked on `notify`); a third
    // admission must be rejected.
    let err = pipeline.handle(request_for("gpt-4o"), &key, "req-3").await.unwrap_err();
    assert!(matches!(err, AppError::RateLimited(_)));

    notify.notify_waiters();
    h1.await.unwrap().unwrap();
    h2.await.unwrap().unwrap();

    // Slots freed; a fourth request now succeeds.
    pipeline.handle(request_for("gpt-4o"), &key, "req-4").await.unwrap();
}

#[tokio::test]
async fn retry_then_success() {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    let config = AppConfig::from_env().unwrap();
    ModelManager::new(catalogue.clone()).seed(&config).await.unwrap();

    let key = CredentialKey::from("sk-retry");
    let retry = RetryConfig { max_retries: 3, retry_delay_ms: 0, fallback_to_lower_tier: true };
    catalogue
        .insert_credential(credential("sk-retry", Decimal::new(100, 0), default_rate_limits(), retry))
        .await
        .unwrap();

    let pipeline = pipeline_with(catalogue.clone(), 2, None).await;

    let result = pipeline.handle(request_for("gpt-4o"), &key, "req-retry").await.unwrap();
    assert_eq!(result.0.usage.total_tokens, 15);

    let txns = catalogue.list_transactions(&key).await.unwrap();
    assert_eq!(txns.len(), 1);
}

/// A two-model fixture deliberately priced so the premium tier's estimate
/// overshoots a near-zero balance while the free-tier fallback's estimate
/// (zero pricing) fits it, isolating the fallback decision from incidental
/// seed-data pricing.
async fn insert_fallback_fixture(catalogue: &InMemoryCatalogue) {
    use llm_gateway_proxy::core_types::ModelId;
    use llm_gateway_proxy::domain::model::{Capabilities, ModelStatus, Pricing, Provider};
    use llm_gateway_proxy::domain::ModelRecord;

    catalogue
        .insert_model(ModelRecord {
            model_id: ModelId::from("premium-model"),
            provider: Provider::OpenAi,
            capability_level: 3,
            capabilities: Capabilities { text: true, image: false, reply: true },
            pricing: Pricing { input_price: Decimal::new(50, 0), output_price: Decimal::new(50, 0), image_input_price: None },
            max_tokens: 1000,
            parameters: HashMap::new(),
            status: ModelStatus::Active,
            display_name: None,
            description: None,
        })
        .await
        .unwrap();

    catalogue
        .insert_model(ModelRecord {
            model_id: ModelId::from("free-tier-model"),
            provider: Provider::OpenAi,
            capability_level: 1,
            capabilities: Capabilities { text: true, image: false, reply: true },
            pricing: Pricing { input_price: Decimal::ZERO, output_price: Decimal::ZERO, image_input_price: None },
            max_tokens: 10,
            parameters: HashMap::new(),
            status: ModelStatus::Active,
            display_name: None,
            description: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn fallback_on_insufficient_balance() {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    insert_fallback_fixture(&catalogue).await;

    let key = CredentialKey::from("sk-fallback");
    let retry = RetryConfig { max_retries: 1, retry_delay_ms: 0, fallback_to_lower_tier: true };
    catalogue
        .insert_credential(credential("sk-fallback", Decimal::new(1, 4), default_rate_limits(), retry))
        .await
        .unwrap();

    let pipeline = pipeline_with(catalogue.clone(), 0, None).await;

    let result = pipeline.handle(request_for("premium-model"), &key, "req-fallback").await.unwrap();
    assert_eq!(result.0.model, "free-tier-model");

    let txns = catalogue.list_transactions(&key).await.unwrap();
    assert_eq!(txns.len(), 1);
}

#[tokio::test]
async fn insufficient_balance_no_fallback() {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    insert_fallback_fixture(&catalogue).await;

    let key = CredentialKey::from("sk-no-fallback");
    let retry = RetryConfig { max_retries: 1, retry_delay_ms: 0, fallback_to_lower_tier: false };
    catalogue
        .insert_credential(credential("sk-no-fallback", Decimal::new(1, 4), default_rate_limits(), retry))
        .await
        .unwrap();

    let pipeline = pipeline_with(catalogue.clone(), 0, None).await;

    let err = pipeline.handle(request_for("premium-model"), &key, "req-no-fallback").await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance(_)));

    let txns = catalogue.list_transactions(&key).await.unwrap();
    assert!(txns.is_empty());
}
