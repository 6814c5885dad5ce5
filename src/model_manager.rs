//! Model Manager (C7): catalogue reads, default seed, lower-tier search.
//!
//! Seed data: four built-in models spanning three providers and multiple
//! capability tiers, an admin credential, and one default normal-tier
//! credential.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::catalogue::{CatalogueError, CatalogueStore};
use crate::config::AppConfig;
use crate::core_types::{CredentialKey, ModelId};
use crate::domain::model::{Capabilities, ModelPatch, ModelStatus, ParameterSchema, Pricing, Provider};
use crate::domain::{CredentialRecord, CredentialStatus, ModelRecord, Tier};

pub struct ModelManager {
    catalogue: Arc<dyn CatalogueStore>,
}

impl ModelManager {
    pub fn new(catalogue: Arc<dyn CatalogueStore>) -> Self {
        Self { catalogue }
    }

    pub async fn get(&self, model_id: &ModelId) -> Result<Option<ModelRecord>, CatalogueError> {
        self.catalogue.find_model(model_id).await
    }

    pub async fn list_active(&self) -> Result<Vec<ModelRecord>, CatalogueError> {
        self.catalogue.list_active_models().await
    }

    pub async fn update(&self, model_id: &ModelId, patch: ModelPatch) -> Result<ModelRecord, CatalogueError> {
        self.catalogue.update_model(model_id, patch).await
    }

    /// Highest-`capability_level` active model strictly below `current_level`
    /// that satisfies every `true` flag in `required` (spec.md §4.7).
    pub async fn find_lower_tier(
        &self,
        current_level: i32,
        required: Capabilities,
    ) -> Result<Option<ModelRecord>, CatalogueError> {
        self.catalogue.find_lower_tier_model(current_level, required).await
    }

    /// On first start: bulk-insert the built-in models if `models` is empty,
    /// and seed the admin + default normal-tier credentials if `credentials`
    /// is empty (spec.md §4.7).
    pub async fn seed(&self, config: &AppConfig) -> Result<(), CatalogueError> {
        if self.catalogue.count_models().await? == 0 {
            for model in default_models() {
                self.catalogue.insert_model(model).await?;
            }
        }

        if self.catalogue.count_credentials().await? == 0 {
            let now = chrono::Utc::now();

            self.catalogue
                .insert_credential(CredentialRecord {
                    api_key: CredentialKey::from(config.admin_api_key.clone()),
                    tier: Tier::Admin,
                    balance: Decimal::new(1_000_000, 0),
                    rate_limits: config
                        .default_rate_limits
                        .get(&Tier::Admin)
                        .copied()
                        .expect("admin tier rate limits configured"),
                    retry_config: config.default_retry_config,
                    status: CredentialStatus::Active,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            self.catalogue
                .insert_credential(CredentialRecord {
                    api_key: CredentialKey::from(format!("{}default", config.credential_prefix)),
                    tier: Tier::Normal,
                    balance: Decimal::new(100, 0),
                    rate_limits: config
                        .default_rate_limits
                        .get(&Tier::Normal)
                        .copied()
                        .expect("normal tier rate limits configured"),
                    retry_config: config.default_retry_config,
                    status: CredentialStatus::Active,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
        }

        Ok(())
    }
}

fn default_models() -> Vec<ModelRecord> {
    vec![
        ModelRecord {
            model_id: ModelId::from("gpt-4o"),
            provider: Provider::OpenAi,
            capability_level: 3,
            capabilities: Capabilities { text: true, image: true, reply: true },
            pricing: Pricing {
                input_price: Decimal::new(15, 0),
                output_price: Decimal::new(50, 0),
                image_input_price: Some(Decimal::new(7650, 3)),
            },
            max_tokens: 4096,
            parameters: standard_parameters(4096),
            status: ModelStatus::Active,
            display_name: Some("GPT-4o".to_string()),
            description: Some("OpenAI's flagship multimodal model.".to_string()),
        },
        ModelRecord {
            model_id: ModelId::from("claude-3.5-sonnet"),
            provider: Provider::Anthropic,
            capability_level: 3,
            capabilities: Capabilities { text: true, image: true, reply: true },
            pricing: Pricing {
                input_price: Decimal::new(3, 0),
                output_price: Decimal::new(15, 0),
                image_input_price: None,
            },
            max_tokens: 8192,
            parameters: standard_parameters(8192),
            status: ModelStatus::Active,
            display_name: Some("Claude 3.5 Sonnet".to_string()),
            description: Some("Anthropic's mid-tier multimodal model.".to_string()),
        },
        ModelRecord {
            model_id: ModelId::from("grok-vision-beta"),
            provider: Provider::Xai,
            capability_level: 2,
            capabilities: Capabilities { text: true, image: true, reply: true },
            pricing: Pricing {
                input_price: Decimal::new(5, 0),
                output_price: Decimal::new(15, 0),
                image_input_price: None,
            },
            max_tokens: 8192,
            parameters: standard_parameters(8192),
            status: ModelStatus::Active,
            display_name: Some("Grok Vision Beta".to_string()),
            description: Some("xAI's vision-capable model.".to_string()),
        },
        ModelRecord {
            model_id: ModelId::from("grok-2-vision-1212"),
            provider: Provider::Xai,
            capability_level: 1,
            capabilities: Capabilities { text: true, image: true, reply: true },
            pricing: Pricing {
                input_price: Decimal::new(2, 0),
                output_price: Decimal::new(10, 0),
                image_input_price: None,
            },
            max_tokens: 4096,
            parameters: standard_parameters(4096),
            status: ModelStatus::Active,
            display_name: Some("Grok 2 Vision".to_string()),
            description: Some("xAI's cost-efficient fallback tier model.".to_string()),
        },
    ]
}

fn standard_parameters(max_tokens_cap: i64) -> HashMap<String, ParameterSchema> {
    let mut params = HashMap::new();
    params.insert(
        "temperature".to_string(),
        ParameterSchema::Float { min: Some(0.0), max: Some(2.0), default: Some(1.0) },
    );
    params.insert(
        "top_p".to_string(),
        ParameterSchema::Float { min: Some(0.0), max: Some(1.0), default: Some(1.0) },
    );
    params.insert(
        "frequency_penalty".to_string(),
        ParameterSchema::Float { min: Some(-2.0), max: Some(2.0), default: Some(0.0) },
    );
    params.insert(
        "presence_penalty".to_string(),
        ParameterSchema::Float { min: Some(-2.0), max: Some(2.0), default: Some(0.0) },
    );
    params.insert(
        "max_tokens".to_string(),
        ParameterSchema::Int { min: Some(1), max: Some(max_tokens_cap), default: Some(1024) },
    );
    params
}
