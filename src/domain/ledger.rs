//! Request Log Entry, Transaction Entry, Retry Attempt (spec.md §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core_types::{CredentialKey, ModelId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub status: RetryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub api_key: CredentialKey,
    pub model_id: ModelId,
    pub timestamp: DateTime<Utc>,
    /// Request parameters excluding message bodies (spec.md §3).
    pub parameters: HashMap<String, Value>,
    /// role -> message count.
    pub message_types: HashMap<String, u32>,
    pub usage: Option<crate::domain::canonical::Usage>,
    pub cost: Option<Decimal>,
    pub status: RequestStatus,
    pub retry_attempts: Vec<RetryAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deduction,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub timestamp: DateTime<Utc>,
    pub api_key: CredentialKey,
    pub amount: Decimal,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub kind: TransactionKind,
}
