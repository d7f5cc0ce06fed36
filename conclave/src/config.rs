//! Engine configuration and feature flags.
//!
//! Everything here is plain data read once from the environment at startup
//! and then injected into the components that need it. No globals: the
//! engine, router, and judge all borrow an [`EngineConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default council roster, in discovery order.
pub const DEFAULT_COUNCIL_MODELS: [&str; 4] = [
    "openai/gpt-5.1",
    "google/gemini-3-pro-preview",
    "anthropic/claude-sonnet-4.5",
    "x-ai/grok-4",
];

/// Model that writes the stage-3 synthesis.
pub const DEFAULT_CHAIRMAN_MODEL: &str = "google/gemini-3-pro-preview";

/// Cheap model used for intent classification and titles.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "google/gemini-2.5-flash";

/// Default judge model; override with `JUDGE_MODEL`.
pub const DEFAULT_JUDGE_MODEL: &str = "openai/o1";

/// OpenRouter chat completions endpoint.
pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Feature gates, each backed by an `ENABLE_*` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Run the intent classifier before the council (`ENABLE_INTENT_CLASSIFICATION`).
    pub intent_classification: bool,
    /// Allow pre-council tool augmentation (`ENABLE_TOOLS`).
    pub tools_enabled: bool,
    /// Register retrieval tools for workspaces that want them (`ENABLE_RAG`).
    pub rag_enabled: bool,
    /// Run the post-hoc judge pass (`ENABLE_JUDGE`).
    pub judge_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            intent_classification: true,
            tools_enabled: true,
            rag_enabled: true,
            judge_enabled: false,
        }
    }
}

impl FeatureFlags {
    /// Read flags from the environment, falling back to the defaults above.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            intent_classification: env_flag(
                "ENABLE_INTENT_CLASSIFICATION",
                defaults.intent_classification,
            ),
            tools_enabled: env_flag("ENABLE_TOOLS", defaults.tools_enabled),
            rag_enabled: env_flag("ENABLE_RAG", defaults.rag_enabled),
            judge_enabled: env_flag("ENABLE_JUDGE", defaults.judge_enabled),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Per-complexity default rosters used when a workspace does not pin one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierRosters {
    pub simple: Vec<String>,
    pub moderate: Vec<String>,
    pub complex: Vec<String>,
}

impl Default for TierRosters {
    fn default() -> Self {
        Self {
            simple: vec!["google/gemini-3-pro-preview".into()],
            moderate: vec![
                "anthropic/claude-sonnet-4.5".into(),
                "openai/gpt-5.1".into(),
            ],
            complex: vec![
                "anthropic/claude-sonnet-4.5".into(),
                "openai/gpt-5.1".into(),
                "google/gemini-3-pro-preview".into(),
            ],
        }
    }
}

/// Top-level engine configuration.
///
/// `Default` gives compiled-in models and timeouts with no credentials;
/// [`EngineConfig::from_env`] additionally picks up the API key, model
/// overrides, and feature flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// OpenRouter API key (`OPENROUTER_API_KEY`). `None` is fine for tests
    /// that never touch the HTTP provider.
    pub api_key: Option<String>,
    /// Chat completions endpoint (`OPENROUTER_API_URL`).
    pub api_url: String,
    /// Full council roster for expert-tier deliberations.
    pub council_models: Vec<String>,
    /// Per-complexity rosters below expert tier.
    pub tier_rosters: TierRosters,
    pub chairman_model: String,
    pub classifier_model: String,
    pub title_model: String,
    pub judge_model: String,
    /// Stage 1/2/3 generation budget per call.
    pub generation_timeout: Duration,
    pub classifier_timeout: Duration,
    pub title_timeout: Duration,
    pub judge_timeout: Duration,
    pub flags: FeatureFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            council_models: DEFAULT_COUNCIL_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            tier_rosters: TierRosters::default(),
            chairman_model: DEFAULT_CHAIRMAN_MODEL.to_string(),
            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            title_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            generation_timeout: Duration::from_secs(120),
            classifier_timeout: Duration::from_secs(10),
            title_timeout: Duration::from_secs(30),
            judge_timeout: Duration::from_secs(60),
            flags: FeatureFlags::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = std::env::var("OPENROUTER_API_KEY").ok();
        if let Ok(url) = std::env::var("OPENROUTER_API_URL") {
            config.api_url = url;
        }
        if let Ok(model) = std::env::var("CHAIRMAN_MODEL") {
            config.chairman_model = model;
        }
        if let Ok(model) = std::env::var("INTENT_CLASSIFIER_MODEL") {
            config.classifier_model = model.clone();
            config.title_model = model;
        }
        if let Ok(model) = std::env::var("JUDGE_MODEL") {
            config.judge_model = model;
        }
        config.flags = FeatureFlags::from_env();
        config
    }

    /// Roster for a deliberation when nothing narrower was chosen.
    pub fn full_council(&self) -> Vec<String> {
        self.council_models.clone()
    }
}
