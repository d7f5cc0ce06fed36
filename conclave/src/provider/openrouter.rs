//! OpenRouter-backed [`CapabilityProvider`].
//!
//! One POST per completion against the chat-completions endpoint, Bearer
//! auth, JSON payload `{model, messages}`. Timeouts are enforced per request
//! with the budget the caller hands in.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    CapabilityProvider, ChatMessage, CompletionResponse, ProviderError, ProviderResult,
    TokenUsage,
};
use crate::config::EngineConfig;

/// Provider speaking the OpenRouter chat API.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl OpenRouterProvider {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from engine config; fails when no API key is present.
    pub fn from_config(config: &EngineConfig) -> ProviderResult<Self> {
        let api_key = config.api_key.clone().ok_or(ProviderError::MissingKey)?;
        Ok(Self::new(config.api_url.clone(), api_key))
    }
}

#[async_trait]
impl CapabilityProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> ProviderResult<CompletionResponse> {
        let payload = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        debug!(model = %model, messages = messages.len(), "posting completion request");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ProviderError::Timeout {
                        model: model.to_string(),
                        seconds: timeout.as_secs(),
                    }
                } else {
                    ProviderError::Http(error)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let body: WireResponse = response.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyChoices)?;
        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning,
            usage: body.usage,
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s[..cut].to_string()
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_api_key() {
        let config = EngineConfig::default();
        assert!(matches!(
            OpenRouterProvider::from_config(&config),
            Err(ProviderError::MissingKey)
        ));
    }

    #[test]
    fn wire_response_extracts_content_and_usage() {
        let raw = serde_json::json!({
            "id": "gen-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Paris is the capital of France.",
                    "reasoning": "recalled geography"
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 9, "total_tokens": 21}
        });
        let parsed: WireResponse = serde_json::from_value(raw).unwrap();
        let choice = &parsed.choices[0];
        assert_eq!(
            choice.message.content.as_deref(),
            Some("Paris is the capital of France.")
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 21);
    }

    #[test]
    fn wire_response_tolerates_missing_fields() {
        let raw = serde_json::json!({"choices": [{"message": {}}]});
        let parsed: WireResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 500), "short");
        let long = "é".repeat(300);
        let cut = truncate(&long, 500);
        assert!(cut.len() <= 500);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn messages_serialize_with_snake_case_roles() {
        let payload = serde_json::to_value(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
        ])
        .unwrap();
        assert_eq!(payload[0]["role"], "system");
        assert_eq!(payload[1]["role"], "user");
    }
}
