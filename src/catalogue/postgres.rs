//! Postgres-backed `CatalogueStore`, enabled by the `postgres` feature.
//!
//! A `PgPool` wrapped in a thin repository type, using runtime-checked
//! `sqlx::query`/`query_as` only — never the compile-time `query!` macros,
//! since there is no live `DATABASE_URL` to validate against at build time
//! here. Each record type gets one table with a JSONB payload column plus
//! the indexed key column the spec's unique-index invariant (I5) needs.
//!
//! Expected schema (see `migrations/` in a real deployment):
//! ```sql
//! CREATE TABLE models (model_id TEXT PRIMARY KEY, data JSONB NOT NULL);
//! CREATE TABLE credentials (api_key TEXT PRIMARY KEY, data JSONB NOT NULL);
//! CREATE TABLE requests (request_id TEXT PRIMARY KEY, data JSONB NOT NULL);
//! CREATE TABLE transactions (id BIGSERIAL PRIMARY KEY, api_key TEXT NOT NULL, data JSONB NOT NULL);
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use super::{CatalogueError, CatalogueStore};
use crate::core_types::{CredentialKey, ModelId};
use crate::domain::model::ModelPatch;
use crate::domain::{Capabilities, CredentialRecord, ModelRecord, RequestLogEntry, TransactionEntry, TransactionKind};

pub struct PostgresCatalogue {
    pool: PgPool,
}

impl PostgresCatalogue {
    pub async fn connect(database_url: &str) -> Result<Self, CatalogueError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CatalogueStore for PostgresCatalogue {
    async fn find_model(&self, model_id: &ModelId) -> Result<Option<ModelRecord>, CatalogueError> {
        let row: Option<(Json<ModelRecord>,)> = sqlx::query_as("SELECT data FROM models WHERE model_id = $1")
            .bind(model_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(row.map(|(Json(record),)| record))
    }

    async fn list_active_models(&self) -> Result<Vec<ModelRecord>, CatalogueError> {
        let rows: Vec<(Json<ModelRecord>,)> = sqlx::query_as("SELECT data FROM models")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|(Json(r),)| r).filter(|r| r.is_active()).collect())
    }

    async fn insert_model(&self, model: ModelRecord) -> Result<(), CatalogueError> {
        let result = sqlx::query("INSERT INTO models (model_id, data) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(model.model_id.as_str())
            .bind(Json(&model))
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(CatalogueError::Conflict);
        }
        Ok(())
    }

    async fn update_model(&self, model_id: &ModelId, patch: ModelPatch) -> Result<ModelRecord, CatalogueError> {
        let mut tx = self.pool.begin().await.map_err(|e| CatalogueError::Backend(e.to_string()))?;

        let row: Option<(Json<ModelRecord>,)> = sqlx::query_as("SELECT data FROM models WHERE model_id = $1 FOR UPDATE")
            .bind(model_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        let Some((Json(existing),)) = row else {
            return Err(CatalogueError::NotFound);
        };

        let updated = patch.apply(existing);

        sqlx::query("UPDATE models SET data = $2 WHERE model_id = $1")
            .bind(model_id.as_str())
            .bind(Json(&updated))
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;

        tx.commit().await.map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(updated)
    }

    async fn count_models(&self) -> Result<usize, CatalogueError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM models")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(count as usize)
    }

    async fn find_lower_tier_model(
        &self,
        current_level: i32,
        required: Capabilities,
    ) -> Result<Option<ModelRecord>, CatalogueError> {
        let models = self.list_active_models().await?;
        let mut candidates: Vec<ModelRecord> = models
            .into_iter()
            .filter(|r| r.capability_level < current_level && r.capabilities.satisfies(&required))
            .collect();
        candidates.sort_by(|a, b| {
            b.capability_level
                .cmp(&a.capability_level)
                .then_with(|| a.model_id.as_str().cmp(b.model_id.as_str()))
        });
        Ok(candidates.into_iter().next())
    }

    async fn find_credential(&self, api_key: &CredentialKey) -> Result<Option<CredentialRecord>, CatalogueError> {
        let row: Option<(Json<CredentialRecord>,)> = sqlx::query_as("SELECT data FROM credentials WHERE api_key = $1")
            .bind(api_key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(row.map(|(Json(record),)| record))
    }

    async fn insert_credential(&self, credential: CredentialRecord) -> Result<(), CatalogueError> {
        let result = sqlx::query("INSERT INTO credentials (api_key, data) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(credential.api_key.as_str())
            .bind(Json(&credential))
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(CatalogueError::Conflict);
        }
        Ok(())
    }

    async fn count_credentials(&self) -> Result<usize, CatalogueError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credentials")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(count as usize)
    }

    async fn deduct_balance(
        &self,
        api_key: &CredentialKey,
        cost: Decimal,
    ) -> Result<TransactionEntry, CatalogueError> {
        let mut tx = self.pool.begin().await.map_err(|e| CatalogueError::Backend(e.to_string()))?;

        let row: Option<(Json<CredentialRecord>,)> =
            sqlx::query_as("SELECT data FROM credentials WHERE api_key = $1 FOR UPDATE")
                .bind(api_key.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        let Some((Json(mut credential),)) = row else {
            return Err(CatalogueError::NotFound);
        };

        let previous_balance = credential.balance;
        let new_balance = previous_balance - cost;
        credential.balance = new_balance;
        credential.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE credentials SET data = $2 WHERE api_key = $1")
            .bind(api_key.as_str())
            .bind(Json(&credential))
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;

        let txn = TransactionEntry {
            timestamp: chrono::Utc::now(),
            api_key: api_key.clone(),
            amount: cost,
            previous_balance,
            new_balance,
            kind: TransactionKind::Deduction,
        };

        sqlx::query("INSERT INTO transactions (api_key, data) VALUES ($1, $2)")
            .bind(api_key.as_str())
            .bind(Json(&txn))
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;

        tx.commit().await.map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(txn)
    }

    async fn insert_request_log(&self, entry: RequestLogEntry) -> Result<(), CatalogueError> {
        sqlx::query("INSERT INTO requests (request_id, data) VALUES ($1, $2) ON CONFLICT (request_id) DO NOTHING")
            .bind(&entry.request_id)
            .bind(Json(&entry))
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_transactions(&self, api_key: &CredentialKey) -> Result<Vec<TransactionEntry>, CatalogueError> {
        let rows: Vec<(Json<TransactionEntry>,)> =
            sqlx::query_as("SELECT data FROM transactions WHERE api_key = $1")
                .bind(api_key.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CatalogueError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|(Json(t),)| t).collect())
    }
}
