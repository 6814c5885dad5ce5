//! Shared application state, injected into every handler (spec.md §9:
//! "process-wide singletons... re-expressed as dependencies injected into
//! the Pipeline at construction").

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalogue::CatalogueStore;
use crate::config::AppConfig;
use crate::domain::model::Provider;
use crate::model_manager::ModelManager;
use crate::pipeline::RequestPipeline;
use crate::providers::ProviderAdapter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalogue: Arc<dyn CatalogueStore>,
    pub models: Arc<ModelManager>,
    pub pipeline: Arc<RequestPipeline>,
}

impl AppState {
    pub fn new(config: AppConfig, catalogue: Arc<dyn CatalogueStore>, counters: Arc<dyn crate::counters::CounterStore>) -> Self {
        let client = reqwest::Client::new();
        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            Provider::OpenAi,
            Arc::new(crate::providers::openai::OpenAiAdapter::new(client.clone(), config.openai_api_key.clone())),
        );
        adapters.insert(
            Provider::Anthropic,
            Arc::new(crate::providers::anthropic::AnthropicAdapter::new(client.clone(), config.anthropic_api_key.clone())),
        );
        adapters.insert(
            Provider::Xai,
            Arc::new(crate::providers::xai::XaiAdapter::new(client, config.xai_api_key.clone())),
        );

        let models = Arc::new(ModelManager::new(catalogue.clone()));
        let pipeline = Arc::new(RequestPipeline::new(catalogue.clone(), counters, adapters));

        Self { config: Arc::new(config), catalogue, models, pipeline }
    }
}
