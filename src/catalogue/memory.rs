//! In-memory `CatalogueStore`, the default backend.
//!
//! `DashMap`s keyed the same way the catalogue's unique indexes are declared
//! (`models.model_id`, `credentials.api_key`), in place of `postgres.rs`'s
//! row-per-table model.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::{CatalogueError, CatalogueStore};
use crate::core_types::{CredentialKey, ModelId};
use crate::domain::model::ModelPatch;
use crate::domain::{CredentialRecord, ModelRecord, RequestLogEntry, TransactionEntry, TransactionKind};

pub struct InMemoryCatalogue {
    models: DashMap<String, ModelRecord>,
    credentials: DashMap<String, CredentialRecord>,
    requests: std::sync::Mutex<Vec<RequestLogEntry>>,
    transactions: std::sync::Mutex<Vec<TransactionEntry>>,
}

impl InMemoryCatalogue {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            credentials: DashMap::new(),
            requests: std::sync::Mutex::new(Vec::new()),
            transactions: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogueStore for InMemoryCatalogue {
    async fn find_model(&self, model_id: &ModelId) -> Result<Option<ModelRecord>, CatalogueError> {
        Ok(self.models.get(model_id.as_str()).map(|r| r.clone()))
    }

    async fn list_active_models(&self) -> Result<Vec<ModelRecord>, CatalogueError> {
        Ok(self.models.iter().filter(|r| r.is_active()).map(|r| r.clone()).collect())
    }

    async fn insert_model(&self, model: ModelRecord) -> Result<(), CatalogueError> {
        if self.models.contains_key(model.model_id.as_str()) {
            return Err(CatalogueError::Conflict);
        }
        self.models.insert(model.model_id.as_str().to_string(), model);
        Ok(())
    }

    async fn update_model(&self, model_id: &ModelId, patch: ModelPatch) -> Result<ModelRecord, CatalogueError> {
        let mut entry = self
            .models
            .get_mut(model_id.as_str())
            .ok_or(CatalogueError::NotFound)?;
        let updated = patch.apply(entry.clone());
        *entry = updated.clone();
        Ok(updated)
    }

    async fn count_models(&self) -> Result<usize, CatalogueError> {
        Ok(self.models.len())
    }

    async fn find_lower_tier_model(
        &self,
        current_level: i32,
        required: crate::domain::Capabilities,
    ) -> Result<Option<ModelRecord>, CatalogueError> {
        let mut candidates: Vec<ModelRecord> = self
            .models
            .iter()
            .filter(|r| r.is_active() && r.capability_level < current_level && r.capabilities.satisfies(&required))
            .map(|r| r.clone())
            .collect();
        candidates.sort_by(|a, b| {
            b.capability_level
                .cmp(&a.capability_level)
                .then_with(|| a.model_id.as_str().cmp(b.model_id.as_str()))
        });
        Ok(candidates.into_iter().next())
    }

    async fn find_credential(&self, api_key: &CredentialKey) -> Result<Option<CredentialRecord>, CatalogueError> {
        Ok(self.credentials.get(api_key.as_str()).map(|r| r.clone()))
    }

    async fn insert_credential(&self, credential: CredentialRecord) -> Result<(), CatalogueError> {
        if self.credentials.contains_key(credential.api_key.as_str()) {
            return Err(CatalogueError::Conflict);
        }
        self.credentials
            .insert(credential.api_key.as_str().to_string(), credential);
        Ok(())
    }

    async fn count_credentials(&self) -> Result<usize, CatalogueError> {
        Ok(self.credentials.len())
    }

    async fn deduct_balance(
        &self,
        api_key: &CredentialKey,
        cost: Decimal,
    ) -> Result<TransactionEntry, CatalogueError> {
        // Holding the DashMap shard lock for the whole read-modify-write
        // makes this atomic with respect to other `deduct_balance` calls on
        // the same key — the property P8 (ledger conservation) depends on.
        let mut entry = self
            .credentials
            .get_mut(api_key.as_str())
            .ok_or(CatalogueError::NotFound)?;
        let previous_balance = entry.balance;
        let new_balance = previous_balance - cost;
        entry.balance = new_balance;
        entry.updated_at = Utc::now();
        drop(entry);

        let txn = TransactionEntry {
            timestamp: Utc::now(),
            api_key: api_key.clone(),
            amount: cost,
            previous_balance,
            new_balance,
            kind: TransactionKind::Deduction,
        };
        self.transactions.lock().unwrap().push(txn.clone());
        Ok(txn)
    }

    async fn insert_request_log(&self, entry: RequestLogEntry) -> Result<(), CatalogueError> {
        self.requests.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list_transactions(&self, api_key: &CredentialKey) -> Result<Vec<TransactionEntry>, CatalogueError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| &t.api_key == api_key)
            .cloned()
            .collect())
    }
}
