//! Canonical chat-completion request/response shapes (spec.md §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Message content is either a plain string or a list of typed items.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Items(Vec<ContentItem>),
}

impl MessageContent {
    /// Stringified form used for cost estimation (spec.md §4.5): non-string
    /// content is coerced to its JSON text, which over-counts for image
    /// items on purpose (spec.md §9, kept for behavioural parity with the
    /// source this was distilled from).
    pub fn stringified(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Items(items) => {
                serde_json::to_string(items).unwrap_or_default()
            }
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, MessageContent::Items(items) if items.iter().any(|i| matches!(i, ContentItem::ImageUrl { .. })))
    }

    pub fn image_count(&self) -> usize {
        match self {
            MessageContent::Items(items) => items
                .iter()
                .filter(|i| matches!(i, ContentItem::ImageUrl { .. }))
                .count(),
            MessageContent::Text(_) => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

/// The provider-agnostic request body for `POST /v1/chat/completions`.
///
/// Top-level optional parameters beyond `model`/`messages` are kept as loose
/// `Value`s in `extra_params` rather than named fields: the set of
/// parameters a model schema recognises is data (`ModelRecord.parameters`),
/// not part of the wire type, and unknown parameters must pass through
/// untouched per C4's contract.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default)]
    pub stream: bool,
    /// Any other top-level field the caller sent, keyed by name. Carried
    /// through to the validator untouched (spec.md §4.4) and visible to
    /// provider adapters that want to forward it.
    #[serde(flatten)]
    pub extra_params: std::collections::HashMap<String, Value>,
}

impl CanonicalRequest {
    /// The five named optional params plus `extra_params`, merged into one
    /// map, for the validator to iterate over uniformly.
    pub fn named_params(&self) -> std::collections::HashMap<String, Value> {
        let mut out = self.extra_params.clone();
        let mut insert = |k: &str, v: &Option<Value>| {
            if let Some(v) = v {
                out.insert(k.to_string(), v.clone());
            }
        };
        insert("temperature", &self.temperature);
        insert("max_tokens", &self.max_tokens);
        insert("top_p", &self.top_p);
        insert("frequency_penalty", &self.frequency_penalty);
        insert("presence_penalty", &self.presence_penalty);
        out
    }

    pub fn set_param(&mut self, name: &str, value: Value) {
        match name {
            "temperature" => self.temperature = Some(value),
            "max_tokens" => self.max_tokens = Some(value),
            "top_p" => self.top_p = Some(value),
            "frequency_penalty" => self.frequency_penalty = Some(value),
            "presence_penalty" => self.presence_penalty = Some(value),
            other => {
                self.extra_params.insert(other.to_string(), value);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CanonicalResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}
