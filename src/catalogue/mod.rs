//! Catalogue Store (C2): persistent lookup for models, credentials, request
//! logs, and transactions.
//!
//! Four logical collections — models, credentials, requests, transactions —
//! with unique indexes on `models.model_id` and `credentials.api_key`. The
//! pipeline only ever needs typed reads/writes against those four, so this
//! crate exposes a typed `CatalogueStore` trait instead of a generic
//! document API — narrower, and every call site is checked at compile time.
//!
//! Two implementations: `memory::InMemoryCatalogue` (default, matches the
//! "in-process implementation satisfies the contract" note in spec.md
//! §4.1/§4.2) and, behind the `postgres` feature,
//! `postgres::PostgresCatalogue`.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::core_types::{CredentialKey, ModelId};
use crate::domain::{CredentialRecord, ModelRecord, RequestLogEntry, TransactionEntry};
use crate::domain::model::ModelPatch;

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Conflict,
    #[error("catalogue backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CatalogueStore: Send + Sync {
    async fn find_model(&self, model_id: &ModelId) -> Result<Option<ModelRecord>, CatalogueError>;
    async fn list_active_models(&self) -> Result<Vec<ModelRecord>, CatalogueError>;
    async fn insert_model(&self, model: ModelRecord) -> Result<(), CatalogueError>;
    async fn update_model(&self, model_id: &ModelId, patch: ModelPatch) -> Result<ModelRecord, CatalogueError>;
    async fn count_models(&self) -> Result<usize, CatalogueError>;

    /// Returns the highest-`capability_level` active model strictly below
    /// `current_level` whose capabilities satisfy every `true` flag in
    /// `required`. Ties break on `model_id` lexicographic order (spec.md
    /// §4.7).
    async fn find_lower_tier_model(
        &self,
        current_level: i32,
        required: crate::domain::Capabilities,
    ) -> Result<Option<ModelRecord>, CatalogueError>;

    async fn find_credential(&self, api_key: &CredentialKey) -> Result<Option<CredentialRecord>, CatalogueError>;
    async fn insert_credential(&self, credential: CredentialRecord) -> Result<(), CatalogueError>;
    async fn count_credentials(&self) -> Result<usize, CatalogueError>;

    /// Reads the current balance, writes `new_balance`, and appends a
    /// transaction entry, as one logical unit (spec.md §4.5/§7). Returns the
    /// previous balance so the caller can build the transaction's audit
    /// fields without a second read.
    async fn deduct_balance(
        &self,
        api_key: &CredentialKey,
        cost: rust_decimal::Decimal,
    ) -> Result<TransactionEntry, CatalogueError>;

    async fn insert_request_log(&self, entry: RequestLogEntry) -> Result<(), CatalogueError>;
    async fn list_transactions(&self, api_key: &CredentialKey) -> Result<Vec<TransactionEntry>, CatalogueError>;
}
