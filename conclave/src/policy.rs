//! Workspace deliberation policies.
//!
//! A workspace (a named context a query arrives in) carries defaults for the
//! deliberation: which models to run, which tools it may use, how much
//! material the chairman sees. Five policies are compiled in; a TOML file can
//! overlay or extend them. Lookup never fails, unknown workspaces get the
//! `General` policy.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::DEFAULT_COUNCIL_MODELS;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// How much stage-1/stage-2 material the synthesis prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisBudget {
    /// Top-ranked response only, rankings replaced with a placeholder.
    Minimal,
    /// At most two responses, full ranking texts.
    #[default]
    Standard,
    /// Everything the council produced.
    Comprehensive,
}

impl SynthesisBudget {
    /// Parse a budget token leniently; anything unrecognized is `Standard`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => SynthesisBudget::Minimal,
            "comprehensive" => SynthesisBudget::Comprehensive,
            _ => SynthesisBudget::Standard,
        }
    }
}

impl fmt::Display for SynthesisBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SynthesisBudget::Minimal => "minimal",
            SynthesisBudget::Standard => "standard",
            SynthesisBudget::Comprehensive => "comprehensive",
        };
        write!(f, "{s}")
    }
}

/// Per-workspace deliberation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspacePolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Roster this workspace runs by default.
    #[serde(default = "default_council_roster")]
    pub default_models: Vec<String>,
    /// When true the roster above overrides complexity-based routing.
    #[serde(default)]
    pub pin_roster: bool,
    /// Tools this workspace is allowed to invoke.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub rag_enabled: bool,
    /// Retrieval collection for workspaces with document stores.
    #[serde(default)]
    pub rag_collection: Option<String>,
    /// Extra instruction appended to retrieval-augmented prompts.
    #[serde(default)]
    pub rag_prompt_addition: Option<String>,
    #[serde(default)]
    pub synthesis_budget: SynthesisBudget,
    /// Simple queries answered by one model skip chairman synthesis.
    #[serde(default = "default_true")]
    pub skip_synthesis_for_simple: bool,
    /// Run the workspace tools even without classifier suggestions.
    #[serde(default)]
    pub auto_invoke_tools: bool,
}

fn default_council_roster() -> Vec<String> {
    DEFAULT_COUNCIL_MODELS.iter().map(|m| m.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl WorkspacePolicy {
    fn general() -> Self {
        Self {
            name: "General".into(),
            description: "General-purpose queries and conversations".into(),
            default_models: default_council_roster(),
            pin_roster: false,
            tools: vec!["web_search".into(), "calculator".into()],
            rag_enabled: false,
            rag_collection: None,
            rag_prompt_addition: None,
            synthesis_budget: SynthesisBudget::Standard,
            skip_synthesis_for_simple: true,
            auto_invoke_tools: false,
        }
    }

    fn wooster() -> Self {
        Self {
            name: "Wooster".into(),
            description: "Editorial content, articles, and essays".into(),
            default_models: default_council_roster(),
            pin_roster: true,
            tools: vec!["web_search".into(), "rag_search".into()],
            rag_enabled: true,
            rag_collection: Some("wooster_docs".into()),
            rag_prompt_addition: Some(
                "Answer in Wooster's voice: formal, precise, British.".into(),
            ),
            synthesis_budget: SynthesisBudget::Comprehensive,
            skip_synthesis_for_simple: false,
            auto_invoke_tools: true,
        }
    }

    fn bellcourt() -> Self {
        Self {
            name: "Bellcourt".into(),
            description: "Strategy, finance, and business analysis".into(),
            default_models: vec![
                "anthropic/claude-sonnet-4.5".into(),
                "openai/gpt-5.1".into(),
                "google/gemini-3-pro-preview".into(),
            ],
            pin_roster: true,
            tools: vec![
                "rag_search".into(),
                "web_search".into(),
                "calculator".into(),
            ],
            rag_enabled: true,
            rag_collection: Some("bellcourt_docs".into()),
            rag_prompt_addition: None,
            synthesis_budget: SynthesisBudget::Standard,
            skip_synthesis_for_simple: true,
            auto_invoke_tools: false,
        }
    }

    fn cfb25() -> Self {
        Self {
            name: "CFB 25".into(),
            description: "College football analysis, stats, and media".into(),
            default_models: default_council_roster(),
            pin_roster: true,
            tools: vec![
                "sports_data".into(),
                "web_search".into(),
                "calculator".into(),
            ],
            rag_enabled: false,
            rag_collection: None,
            rag_prompt_addition: None,
            synthesis_budget: SynthesisBudget::Standard,
            skip_synthesis_for_simple: true,
            auto_invoke_tools: true,
        }
    }

    fn quant() -> Self {
        Self {
            name: "The Quant".into(),
            description: "Sports betting analysis with quantitative focus".into(),
            default_models: vec![
                "anthropic/claude-sonnet-4.5".into(),
                "openai/gpt-5.1".into(),
            ],
            pin_roster: true,
            tools: vec![
                "calculator".into(),
                "sports_data".into(),
                "code_execution".into(),
            ],
            rag_enabled: false,
            rag_collection: None,
            rag_prompt_addition: None,
            synthesis_budget: SynthesisBudget::Minimal,
            skip_synthesis_for_simple: true,
            auto_invoke_tools: false,
        }
    }
}

/// Shape of a policy overlay file: `[workspaces."Name"]` tables.
#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    workspaces: HashMap<String, WorkspacePolicy>,
}

/// All known workspace policies.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    policies: HashMap<String, WorkspacePolicy>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyStore {
    /// The compiled-in policy set.
    pub fn builtin() -> Self {
        let mut policies = HashMap::new();
        for policy in [
            WorkspacePolicy::general(),
            WorkspacePolicy::wooster(),
            WorkspacePolicy::bellcourt(),
            WorkspacePolicy::cfb25(),
            WorkspacePolicy::quant(),
        ] {
            policies.insert(policy.name.clone(), policy);
        }
        Self { policies }
    }

    /// Built-ins overlaid with entries from a TOML file. File entries replace
    /// built-ins of the same name and may add new workspaces.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PolicyResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: PolicyFile = toml::from_str(&raw)?;
        let mut store = Self::builtin();
        for (name, mut policy) in file.workspaces {
            policy.name = name.clone();
            store.policies.insert(name, policy);
        }
        info!(workspaces = store.policies.len(), "loaded workspace policies");
        Ok(store)
    }

    /// Policy for `workspace`, falling back to `General` for unknown names.
    pub fn get(&self, workspace: &str) -> &WorkspacePolicy {
        let trimmed = workspace.trim();
        self.policies
            .get(trimmed)
            .unwrap_or_else(|| &self.policies["General"])
    }

    pub fn list_workspaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }
}
