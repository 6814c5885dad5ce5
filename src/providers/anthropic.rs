//! Anthropic adapter.
//!
//! Anthropic's Messages API separates a top-level `system` string from the
//! `messages` array and does not accept a `function` role — both handled
//! below.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{wire_content, ProviderAdapter, ProviderError};
use crate::domain::canonical::{CanonicalRequest, CanonicalResponse, Choice, Message, MessageContent, Role, Usage};

const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn complete(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, ProviderError> {
        let mut system_prompt = String::new();
        let mut messages = Vec::new();
        for m in &request.messages {
            if matches!(m.role, Role::System) {
                if let MessageContent::Text(s) = &m.content {
                    system_prompt.push_str(s);
                }
                continue;
            }
            let role = match m.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            let content = wire_content(&self.client, &m.content).await?;
            messages.push(json!({"role": role, "content": content}));
        }

        let max_tokens = request
            .max_tokens
            .as_ref()
            .and_then(|v| v.as_u64())
            .unwrap_or(1024);

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        let body_map = body.as_object_mut().unwrap();
        if !system_prompt.is_empty() {
            body_map.insert("system".to_string(), Value::String(system_prompt));
        }
        if let Some(v) = &request.temperature {
            body_map.insert("temperature".to_string(), v.clone());
        }
        if let Some(v) = &request.top_p {
            body_map.insert("top_p".to_string(), v.clone());
        }

        let response = self
            .client
            .post(ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError(format!("anthropic request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError(format!("anthropic returned {status}: {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError(format!("failed to parse anthropic response: {e}")))?;

        parse_response(&payload, &request.model)
    }
}

fn parse_response(payload: &Value, model: &str) -> Result<CanonicalResponse, ProviderError> {
    let text = payload["content"]
        .get(0)
        .and_then(|c| c["text"].as_str())
        .unwrap_or_default()
        .to_string();

    let input_tokens = payload["usage"]["input_tokens"].as_u64().unwrap_or(0);
    let output_tokens = payload["usage"]["output_tokens"].as_u64().unwrap_or(0);

    Ok(CanonicalResponse {
        id: payload["id"].as_str().unwrap_or_default().to_string(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message { role: Role::Assistant, content: MessageContent::Text(text), name: None },
            finish_reason: payload["stop_reason"].as_str().map(|s| s.to_string()),
        }],
        usage: Usage {
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            total_tokens: input_tokens + output_tokens,
        },
        system_fingerprint: None,
    })
}
