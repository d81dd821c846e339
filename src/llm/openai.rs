use async_trait::async_trait;

use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::ChatProvider;
use crate::llm::types::{CallConfig, ChatMessage};

/// OpenAI-compatible chat-completions client (works against vLLM and
/// similar local servers). Non-streaming only.
pub struct OpenAiChatProvider {
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn new(api_base: String, api_key: String) -> Self {
        Self {
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PilotResult<String> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });

        tracing::debug!(
            model = %cfg.model,
            messages = messages.len(),
            timeout_secs = cfg.timeout.as_secs(),
            "sending chat request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(cfg.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PilotError::LlmTimeout(cfg.timeout.as_secs())
                } else {
                    PilotError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::LlmProvider(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                PilotError::LlmTimeout(cfg.timeout.as_secs())
            } else {
                PilotError::Http(e)
            }
        })?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                PilotError::LlmProvider("response missing choices[0].message.content".into())
            })?
            .to_string();

        tracing::debug!(content_len = content.len(), "chat response received");
        Ok(content)
    }
}
