//! Billing Ledger (C5): estimate, balance check, finalise, deduct.
//!
//! Formulas carried verbatim from spec.md §4.5, §9: the estimate over-counts
//! image items by stringifying their JSON representation into the length
//! sum, and the 20% safety margin and image-cost-at-estimate-only behaviour
//! are both kept on purpose for behavioural parity with the spec.

use std::sync::Arc;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::catalogue::{CatalogueError, CatalogueStore};
use crate::core_types::CredentialKey;
use crate::domain::canonical::{CanonicalRequest, Usage};
use crate::domain::{ModelRecord, TransactionEntry};

const SAFETY_MARGIN: &str = "1.2";
const TOKENS_PER_MILLION: &str = "1000000";

pub struct BillingLedger {
    catalogue: Arc<dyn CatalogueStore>,
}

impl BillingLedger {
    pub fn new(catalogue: Arc<dyn CatalogueStore>) -> Self {
        Self { catalogue }
    }

    /// `1.2 * (input_cost + output_cost + image_cost)` (spec.md §4.5).
    pub fn estimate(&self, request: &CanonicalRequest, model: &ModelRecord) -> Decimal {
        let million = Decimal::from_str(TOKENS_PER_MILLION).unwrap();

        let char_count: u64 = request
            .messages
            .iter()
            .map(|m| m.content.stringified().len() as u64)
            .sum();
        let estimated_input_tokens = char_count.div_ceil(4);
        let input_cost = Decimal::from(estimated_input_tokens) * model.pricing.input_price / million;

        let output_cost = Decimal::from(model.max_tokens) * model.pricing.output_price / million;

        let image_count: u64 = request.messages.iter().map(|m| m.content.image_count() as u64).sum();
        let image_cost = match model.pricing.image_input_price {
            Some(price) => Decimal::from(image_count) * price,
            None => Decimal::ZERO,
        };

        let margin = Decimal::from_str(SAFETY_MARGIN).unwrap();
        margin * (input_cost + output_cost + image_cost)
    }

    /// Advisory only; no hold is placed (spec.md §4.5).
    pub async fn check_balance(&self, api_key: &CredentialKey, estimated: Decimal) -> Result<bool, CatalogueError> {
        let credential = self
            .catalogue
            .find_credential(api_key)
            .await?
            .ok_or(CatalogueError::NotFound)?;
        Ok(credential.balance >= estimated)
    }

    /// Image cost is not re-applied at finalisation; it was approximated at
    /// estimate time only (spec.md §4.5).
    pub fn finalise(&self, usage: &Usage, model: &ModelRecord) -> Decimal {
        let million = Decimal::from_str(TOKENS_PER_MILLION).unwrap();
        model.pricing.input_price * Decimal::from(usage.prompt_tokens) / million
            + model.pricing.output_price * Decimal::from(usage.completion_tokens) / million
    }

    pub async fn deduct(&self, api_key: &CredentialKey, cost: Decimal) -> Result<TransactionEntry, CatalogueError> {
        self.catalogue.deduct_balance(api_key, cost).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::memory::InMemoryCatalogue;
    use crate::core_types::ModelId;
    use crate::domain::canonical::{Message, MessageContent, Role};
    use crate::domain::model::{Capabilities, ModelStatus, Pricing, Provider};
    use std::collections::HashMap;

    fn model() -> ModelRecord {
        ModelRecord {
            model_id: ModelId::from("gpt-4o"),
            provider: Provider::OpenAi,
            capability_level: 3,
            capabilities: Capabilities { text: true, image: true, reply: true },
            pricing: Pricing {
                input_price: Decimal::new(5, 0),
                output_price: Decimal::new(50, 0),
                image_input_price: None,
            },
            max_tokens: 10,
            parameters: HashMap::new(),
            status: ModelStatus::Active,
            display_name: None,
            description: None,
        }
    }

    fn request() -> CanonicalRequest {
        CanonicalRequest {
            model: "gpt-4o".to_string(),
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

    #[test]
    fn finalise_matches_happy_path_scenario() {
        let ledger = BillingLedger::new(std::sync::Arc::new(InMemoryCatalogue::new()));
        let usage = Usage { prompt_tokens: 5, completion_tokens: 10, total_tokens: 15 };
        let cost = ledger.finalise(&usage, &model());
        // 5/1e6*5 + 10/1e6*50 = 0.000525
        assert_eq!(cost, Decimal::new(525, 6));
    }

    #[test]
    fn estimate_applies_safety_margin() {
        let ledger = BillingLedger::new(std::sync::Arc::new(InMemoryCatalogue::new()));
        let est = ledger.estimate(&request(), &model());
        assert!(est > Decimal::ZERO);
    }

    #[tokio::test]
    async fn check_balance_compares_against_stored_balance() {
        let catalogue = Arc::new(InMemoryCatalogue::new());
        let ledger = BillingLedger::new(catalogue.clone());
        let key = CredentialKey::from("sk-test");
        catalogue
            .insert_credential(crate::domain::CredentialRecord {
                api_key: key.clone(),
                tier: crate::domain::Tier::Normal,
                balance: Decimal::new(100, 0),
                rate_limits: crate::domain::RateLimits {
                    requests_per_minute: 60,
                    requests_per_day: 1000,
                    requests_per_month: 10000,
                    concurrent_requests: 10,
                },
                retry_config: crate::domain::RetryConfig { max_retries: 3, retry_delay_ms: 0, fallback_to_lower_tier: true },
                status: crate::domain::CredentialStatus::Active,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        assert!(ledger.check_balance(&key, Decimal::new(50, 0)).await.unwrap());
        assert!(!ledger.check_balance(&key, Decimal::new(150, 0)).await.unwrap());
    }
}
