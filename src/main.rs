//! Bootstrap: load configuration, initialise logging, construct the stores,
//! seed the catalogue, and serve the HTTP router.

use std::sync::Arc;

use llm_gateway_proxy::catalogue::memory::InMemoryCatalogue;
use llm_gateway_proxy::catalogue::CatalogueStore;
use llm_gateway_proxy::config::{AppConfig, CatalogueBackend};
use llm_gateway_proxy::counters::InMemoryCounterStore;
use llm_gateway_proxy::gateway::{build_router, state::AppState};
use llm_gateway_proxy::logging::init_logging;
use llm_gateway_proxy::model_manager::ModelManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _logging_guard = init_logging(&config);

    tracing::info!(service = %config.service_name, env = %config.env, "starting up");

    let catalogue: Arc<dyn CatalogueStore> = match config.catalogue_backend {
        CatalogueBackend::Memory => Arc::new(InMemoryCatalogue::new()),
        #[cfg(feature = "postgres")]
        CatalogueBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("CATALOGUE_BACKEND=postgres requires DATABASE_URL"))?;
            Arc::new(llm_gateway_proxy::catalogue::postgres::PostgresCatalogue::connect(url).await?)
        }
        #[cfg(not(feature = "postgres"))]
        CatalogueBackend::Postgres => {
            anyhow::bail!("CATALOGUE_BACKEND=postgres requires building with --features postgres");
        }
    };

    ModelManager::new(catalogue.clone()).seed(&config).await?;

    let counters = InMemoryCounterStore::new();
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, catalogue, counters);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
