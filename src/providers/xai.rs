//! xAI adapter.
//!
//! xAI's chat-completions endpoint is OpenAI-compatible wire-for-wire; the
//! adapter differs from `OpenAiAdapter` only in endpoint and auth header.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{wire_content, ProviderAdapter, ProviderError};
use crate::domain::canonical::{CanonicalRequest, CanonicalResponse, Choice, Message, MessageContent, Role, Usage};

const ENDPOINT: &str = "https://api.x.ai/v1/chat/completions";

pub struct XaiAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl XaiAdapter {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl ProviderAdapter for XaiAdapter {
    async fn complete(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, ProviderError> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for m in &request.messages {
            let content = wire_content(&self.client, &m.content).await?;
            messages.push(json!({"role": role_str(&m.role), "content": content}));
        }

        let mut body = json!({ "model": request.model, "messages": messages });
        let body_map = body.as_object_mut().unwrap();
        if let Some(v) = &request.temperature {
            body_map.insert("temperature".to_string(), v.clone());
        }
        if let Some(v) = &request.max_tokens {
            body_map.insert("max_tokens".to_string(), v.clone());
        }

        let response = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError(format!("xai request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError(format!("xai returned {status}: {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError(format!("failed to parse xai response: {e}")))?;

        parse_response(&payload)
    }
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Function => "function",
    }
}

fn parse_response(payload: &Value) -> Result<CanonicalResponse, ProviderError> {
    let choice = payload["choices"]
        .get(0)
        .ok_or_else(|| ProviderError("xai response missing choices".to_string()))?;

    let content = choice["message"]["content"].as_str().unwrap_or_default().to_string();

    Ok(CanonicalResponse {
        id: payload["id"].as_str().unwrap_or_default().to_string(),
        object: "chat.completion".to_string(),
        created: payload["created"].as_i64().unwrap_or(0),
        model: payload["model"].as_str().unwrap_or_default().to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message { role: Role::Assistant, content: MessageContent::Text(content), name: None },
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
        }],
        usage: Usage {
            prompt_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: payload["usage"]["total_tokens"].as_u64().unwrap_or(0),
        },
        system_fingerprint: None,
    })
}
