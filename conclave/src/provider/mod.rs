//! Model capability providers.
//!
//! Every model call in the engine goes through [`CapabilityProvider`], a
//! single async seam: the council stages, the intent classifier, titles, and
//! the judge all share it. Production uses [`OpenRouterProvider`]; tests and
//! downstream embedders get the scripted [`MockProvider`].
//!
//! Fan-out is tolerant by contract: [`complete_many`] never fails as a whole,
//! it degrades per model and preserves roster order.

mod openrouter;

pub use openrouter::OpenRouterProvider;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by a provider. Callers that tolerate per-model failure
/// (the stage fan-outs) log these and move on; callers that cannot proceed
/// without a completion propagate them.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model {model} timed out after {seconds}s")]
    Timeout { model: String, seconds: u64 },

    #[error("api returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response contained no choices")]
    EmptyChoices,

    #[error("no api key configured")]
    MissingKey,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        write!(f, "{s}")
    }
}

/// One message in a chat sequence, in the wire shape providers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A completed model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Provider-reported reasoning trace, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
            usage: None,
        }
    }
}

/// The seam every model call goes through.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Short provider name for structured logs.
    fn name(&self) -> &str;

    /// Run one chat completion against `model` within `timeout`.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> ProviderResult<CompletionResponse>;
}

/// Concurrent fan-out over a roster. The output vector is index-aligned with
/// `models`; a failed model yields `None` and a warning, never an error.
pub async fn complete_many(
    provider: &dyn CapabilityProvider,
    models: &[String],
    messages: &[ChatMessage],
    timeout: Duration,
) -> Vec<Option<CompletionResponse>> {
    let calls = models.iter().map(|model| async move {
        match provider.complete(model, messages, timeout).await {
            Ok(response) => Some(response),
            Err(error) => {
                warn!(model = %model, %error, "model call failed, continuing without it");
                None
            }
        }
    });
    future::join_all(calls).await
}

// ───────────────────────── Mock provider ─────────────────────────

/// One recorded call against [`MockProvider`], for test assertions.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    /// Content of the last user message in the sequence.
    pub prompt: String,
}

/// Deterministic in-process provider for tests and examples.
///
/// Replies are scripted per model as FIFO queues: the first call a model
/// receives pops the first queued text, and so on. Models without a script
/// fall back to the default reply. Failure can be injected globally or per
/// model. Every call is recorded.
pub struct MockProvider {
    scripts: Mutex<HashMap<String, VecDeque<String>>>,
    default_reply: String,
    failing_models: Mutex<Vec<String>>,
    fail_all: bool,
    calls: Mutex<Vec<MockCall>>,
}

impl MockProvider {
    /// Provider whose every model answers with the default reply.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_reply: "mock response".to_string(),
            failing_models: Mutex::new(Vec::new()),
            fail_all: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Provider where every call fails.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    /// Queue one reply for `model` (appends; earlier entries pop first).
    pub fn with_reply(self, model: impl Into<String>, reply: impl Into<String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.into())
            .or_default()
            .push_back(reply.into());
        self
    }

    /// Replace the fallback used when a model has no scripted reply left.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Make one specific model fail every call.
    pub fn with_failing_model(self, model: impl Into<String>) -> Self {
        self.failing_models.lock().unwrap().push(model.into());
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _timeout: Duration,
    ) -> ProviderResult<CompletionResponse> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(MockCall {
            model: model.to_string(),
            prompt,
        });

        if self.fail_all || self.failing_models.lock().unwrap().iter().any(|m| m == model) {
            return Err(ProviderError::Api {
                status: 500,
                body: format!("scripted failure for {model}"),
            });
        }

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default_reply.clone());
        Ok(CompletionResponse {
            content: reply,
            reasoning: None,
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn mock_pops_scripted_replies_in_order() {
        let provider = MockProvider::new()
            .with_reply("m/alpha", "first")
            .with_reply("m/alpha", "second");
        let messages = vec![ChatMessage::user("q")];

        let a = provider
            .complete("m/alpha", &messages, Duration::from_secs(1))
            .await
            .unwrap();
        let b = provider
            .complete("m/alpha", &messages, Duration::from_secs(1))
            .await
            .unwrap();
        let c = provider
            .complete("m/alpha", &messages, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(c.content, "mock response");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn complete_many_preserves_order_and_tolerates_failure() {
        let provider = MockProvider::new()
            .with_reply("m/a", "alpha answer")
            .with_reply("m/c", "gamma answer")
            .with_failing_model("m/b");
        let roster = models(&["m/a", "m/b", "m/c"]);
        let messages = vec![ChatMessage::user("q")];

        let results =
            complete_many(&provider, &roster, &messages, Duration::from_secs(1)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().content, "alpha answer");
        assert!(results[1].is_none());
        assert_eq!(results[2].as_ref().unwrap().content, "gamma answer");
    }

    #[tokio::test]
    async fn failing_provider_fails_every_model() {
        let provider = MockProvider::failing();
        let roster = models(&["m/a", "m/b"]);
        let messages = vec![ChatMessage::user("q")];

        let results =
            complete_many(&provider, &roster, &messages, Duration::from_secs(1)).await;
        assert!(results.iter().all(|r| r.is_none()));
    }

    #[tokio::test]
    async fn mock_records_last_user_message_as_prompt() {
        let provider = MockProvider::new();
        let messages = vec![
            ChatMessage::system("you are terse"),
            ChatMessage::user("what is 2+2?"),
        ];
        provider
            .complete("m/a", &messages, Duration::from_secs(1))
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "what is 2+2?");
    }

    #[test]
    fn message_role_displays_snake_case() {
        assert_eq!(MessageRole::System.to_string(), "system");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
    }
}
