//! Environment configuration (SPEC_FULL §4.10).
//!
//! A plain `AppConfig` struct loaded from `std::env`, not a
//! settings-framework object.

use std::collections::HashMap;
use std::env;

use crate::domain::{RateLimits, RetryConfig, Tier};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub env: String,
    pub bind_addr: String,

    pub credential_prefix: String,
    pub admin_api_key: String,

    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub xai_api_key: String,

    pub default_rate_limits: HashMap<Tier, RateLimits>,
    pub default_retry_config: RetryConfig,

    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    pub rotation: String,
    pub use_json: bool,
    pub enable_tracing: bool,

    pub catalogue_backend: CatalogueBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueBackend {
    Memory,
    Postgres,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads configuration from the process environment, falling back to
    /// the same defaults `settings.py`'s `DEFAULT_RATE_LIMITS` /
    /// `DEFAULT_RETRY_CONFIG` hardcode.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut default_rate_limits = HashMap::new();
        default_rate_limits.insert(
            Tier::Limit,
            RateLimits {
                requests_per_minute: 10,
                requests_per_day: 1_000,
                requests_per_month: 10_000,
                concurrent_requests: 2,
            },
        );
        default_rate_limits.insert(
            Tier::Normal,
            RateLimits {
                requests_per_minute: 60,
                requests_per_day: 10_000,
                requests_per_month: 100_000,
                concurrent_requests: 10,
            },
        );
        default_rate_limits.insert(
            Tier::Admin,
            RateLimits {
                requests_per_minute: 100,
                requests_per_day: 100_000,
                requests_per_month: 1_000_000,
                concurrent_requests: 20,
            },
        );

        let catalogue_backend = match env_or("CATALOGUE_BACKEND", "memory").as_str() {
            "postgres" => CatalogueBackend::Postgres,
            _ => CatalogueBackend::Memory,
        };

        Ok(Self {
            service_name: env_or("SERVICE_NAME", "llm-gateway-proxy"),
            env: env_or("ENV", "development"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),

            credential_prefix: env_or("CREDENTIAL_PREFIX", "sk-"),
            admin_api_key: env::var("ADMIN_API_KEY")
                .unwrap_or_else(|_| "sk-admin-dev-only".to_string()),

            openai_api_key: env_or("OPENAI_API_KEY", ""),
            anthropic_api_key: env_or("ANTHROPIC_API_KEY", ""),
            xai_api_key: env_or("XAI_API_KEY", ""),

            default_rate_limits,
            default_retry_config: RetryConfig {
                max_retries: 3,
                retry_delay_ms: 1_000,
                fallback_to_lower_tier: true,
            },

            log_dir: env_or("LOG_DIR", "logs"),
            log_file: env_or("LOG_FILE", "gateway.log"),
            log_level: env_or("LOG_LEVEL", "info"),
            rotation: env_or("LOG_ROTATION", "never"),
            use_json: env_bool("LOG_JSON", false),
            enable_tracing: env_bool("ENABLE_TRACING", true),

            catalogue_backend,
            database_url: env::var("DATABASE_URL").ok(),
        })
    }
}
