//! OpenAI-compatible streaming chat client.
//!
//! `complete` opens a `stream: true` chat.completions call and hands back the
//! raw byte stream; framing and classification belong to the demultiplexer.

use dossier_core::{ByteStream, CompletionProvider, Error, Message, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn base_url_from_env() -> Option<String> {
    env("DOSSIER_OPENAI_COMPAT_BASE_URL")
}

fn api_key_from_env() -> Option<String> {
    env("DOSSIER_OPENAI_COMPAT_API_KEY")
}

fn model_from_env() -> Option<String> {
    env("DOSSIER_OPENAI_COMPAT_MODEL")
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatStream {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatStream {
    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let base_url = base_url_from_env().ok_or_else(|| {
            Error::NotConfigured("missing DOSSIER_OPENAI_COMPAT_BASE_URL".to_string())
        })?;
        let model = model_override.or_else(model_from_env).ok_or_else(|| {
            Error::NotConfigured(
                "missing model (set --model or DOSSIER_OPENAI_COMPAT_MODEL)".to_string(),
            )
        })?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key_from_env(),
            model,
        })
    }

    /// Explicit construction, used by tests pointing at a local fixture.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Accept both `{"error":"msg"}` and OpenAI's `{"error":{"message":"msg"}}`.
fn error_message_from_body(body: &str, status: reqwest::StatusCode) -> String {
    let text = serde_json::from_str::<CompletionErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| match e {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(o) => o
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty());
    text.unwrap_or_else(|| format!("chat.completions HTTP {status}"))
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiCompatStream {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn complete(&self, messages: &[Message]) -> Result<ByteStream> {
        let req = ChatCompletionsRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Completion(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Completion(error_message_from_body(&body, status)));
        }

        Ok(Box::pin(resp.bytes_stream().map(|r| {
            r.map_err(|e| Error::Completion(e.to_string()))
        })))
    }
}
