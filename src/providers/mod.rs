//! Provider Adapter (C6): one `complete` operation per upstream, behind a
//! common trait so the Pipeline (C8) never branches on provider identity.
//!
//! Each adapter owns an upstream HTTP client and an API key, is stateless
//! after construction, and inlines remote image URLs as base64 before
//! calling upstream (the shared `inline_image`/`wire_content` helpers
//! below).

pub mod anthropic;
pub mod openai;
pub mod xai;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::canonical::{CanonicalRequest, CanonicalResponse, ContentItem, MessageContent};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, ProviderError>;
}

/// Fetches `url` and returns a `data:` URI with the bytes base64-encoded,
/// for upstreams that only accept inline image data rather than remote
/// URLs. `data:` URIs are passed through unchanged (spec.md §4.6(a)).
pub(crate) async fn inline_image(client: &reqwest::Client, url: &str) -> Result<String, ProviderError> {
    if url.starts_with("data:") {
        return Ok(url.to_string());
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError(format!("failed to fetch image url: {e}")))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/png")
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProviderError(format!("failed to read image body: {e}")))?;

    let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
    Ok(format!("data:{content_type};base64,{encoded}"))
}

/// Turns canonical message content into the wire shape adapters send
/// upstream, inlining every image item along the way.
pub(crate) async fn wire_content(client: &reqwest::Client, content: &MessageContent) -> Result<Value, ProviderError> {
    match content {
        MessageContent::Text(s) => Ok(Value::String(s.clone())),
        MessageContent::Items(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    ContentItem::Text { text } => out.push(json!({"type": "text", "text": text})),
                    ContentItem::ImageUrl { image_url } => {
                        let inlined = inline_image(client, &image_url.url).await?;
                        out.push(json!({"type": "image_url", "image_url": {"url": inlined}}));
                    }
                }
            }
            Ok(Value::Array(out))
        }
    }
}
