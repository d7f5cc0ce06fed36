//! Intent classification and model routing.
//!
//! Two-tier classifier: an ordered set of regex rules catches the obvious
//! cases for free; anything ambiguous goes to a cheap model that answers in
//! JSON. Every failure path degrades to a moderate-confidence default, so
//! classification is total: a query always gets a complexity, a workflow,
//! and a roster.
//!
//! Routing combines workspace policy with complexity: workspaces that pin a
//! roster always get it, everything else scales the roster with complexity.

pub mod prompts;

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::policy::PolicyStore;
use crate::provider::{CapabilityProvider, ChatMessage};

/// Rough per-model cost used for the estimate surfaced to callers.
const AVG_COST_PER_MODEL: f64 = 0.005;

/// Query complexity tiers, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl Complexity {
    /// Parse a complexity token leniently; unknown tokens become `Moderate`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            "expert" => Complexity::Expert,
            _ => Complexity::Moderate,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::Expert => "expert",
        };
        write!(f, "{s}")
    }
}

/// Deliberation shape chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// One model, no ranking, no synthesis.
    Quick,
    /// Two models, rankings skipped, straight to synthesis.
    DualCheck,
    /// Full three-stage pipeline.
    Deliberation,
    /// Full pipeline over the complete council.
    ExpertPanel,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Workflow::Quick => "quick",
            Workflow::DualCheck => "dual_check",
            Workflow::Deliberation => "deliberation",
            Workflow::ExpertPanel => "expert_panel",
        };
        write!(f, "{s}")
    }
}

/// Which tier produced the classification, for logs and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    RuleTier,
    ModelTier,
    Fallback,
}

/// Full routing decision for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub complexity: Complexity,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_tools: Vec<String>,
    pub workflow: Workflow,
    /// Roster the deliberation will run with.
    pub models: Vec<String>,
    /// Rough USD estimate for the run.
    pub estimated_cost: f64,
    pub source: ClassificationSource,
}

/// Map complexity and roster size onto a workflow shape.
pub fn select_workflow(complexity: Complexity, models: &[String]) -> Workflow {
    match complexity {
        Complexity::Simple => Workflow::Quick,
        Complexity::Moderate => {
            if models.len() == 2 {
                Workflow::DualCheck
            } else {
                Workflow::Deliberation
            }
        }
        Complexity::Complex => Workflow::Deliberation,
        Complexity::Expert => Workflow::ExpertPanel,
    }
}

fn estimate_cost(roster_len: usize) -> f64 {
    (roster_len as f64 * AVG_COST_PER_MODEL * 1000.0).round() / 1000.0
}

/// Verdict of one classifier tier before routing is applied.
struct TierVerdict {
    complexity: Complexity,
    confidence: f64,
    reasoning: String,
    suggested_tools: Vec<String>,
    source: ClassificationSource,
}

/// Compiled rule patterns, grouped by category. Categories are evaluated in
/// a fixed order and the first hit wins.
struct RulePatterns {
    simple: Vec<Regex>,
    complex: Vec<Regex>,
    math_code: Vec<Regex>,
    creative: Vec<Regex>,
    sports: Vec<Regex>,
    web_search: Vec<Regex>,
}

impl RulePatterns {
    fn compile() -> Self {
        Self {
            simple: compile_set(&[
                r"\b(what is|what's|define|meaning of)\b",
                r"^\d+\s*[\+\-\*/]\s*\d+",
                r"\b(hello|hi|hey|thanks|thank you)\b",
            ]),
            complex: compile_set(&[
                r"\b(compare|contrast|analyze|evaluate|assess)\b",
                r"\b(why|how|explain|elaborate)\b.*\b(and|or)\b",
                r"\b(pros and cons|advantages and disadvantages)\b",
                r"\b(comprehensive|detailed|thorough)\b.*\b(analysis|review|report)\b",
            ]),
            math_code: compile_set(&[
                r"\b(calculate|compute|algorithm|optimize|solve)\b",
                r"\b(code|script|program|function|class)\b",
                r"\b(python|javascript|java|sql)\b",
                r"\b(api|endpoint|database)\b",
            ]),
            creative: compile_set(&[
                r"\b(write|draft|compose|create)\b.*\b(article|essay|story|blog|post)\b",
                r"\b(wooster|bellcourt)\b",
                r"\b(style|tone|voice)\b",
            ]),
            sports: compile_set(&[
                r"\b(spread|total|parlay|slate|vegas|line|odds)\b",
                r"\b(cfb|nfl|nba|mlb)\b",
                r"\b(team|player|game|match|score)\b.*\b(stats|statistics|data)\b",
            ]),
            web_search: compile_set(&[
                r"\b(latest|recent|current|today|this week|news)\b",
                r"\b(who is|who are|what happened|when did)\b",
                r"\b(price|cost|value)\b.*\b(of|for)\b",
            ]),
        }
    }
}

fn compile_set(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}

fn matches_any(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Classifier JSON the model tier is asked to produce.
#[derive(Debug, Deserialize)]
struct ClassifierWire {
    complexity: Option<String>,
    reasoning: Option<String>,
    #[serde(default)]
    tools_needed: Vec<String>,
    confidence: Option<f64>,
}

/// Strip a surrounding markdown code fence, tolerating a `json` language tag.
fn strip_markdown_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let inner = trimmed.trim_start_matches('`');
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    match inner.find("```") {
        Some(end) => inner[..end].trim(),
        None => inner.trim(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Two-tier intent router.
pub struct IntentRouter {
    provider: Arc<dyn CapabilityProvider>,
    config: EngineConfig,
    policies: PolicyStore,
    patterns: RulePatterns,
}

impl IntentRouter {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        config: EngineConfig,
        policies: PolicyStore,
    ) -> Self {
        Self {
            provider,
            config,
            policies,
            patterns: RulePatterns::compile(),
        }
    }

    /// Classify a query and derive the full routing decision. Total: every
    /// failure path lands on the moderate-confidence fallback.
    pub async fn classify(&self, query: &str, workspace: &str) -> IntentClassification {
        let verdict = match self.rule_tier(query) {
            Some(verdict) => verdict,
            None => self.model_tier(query).await,
        };

        let models = self.route_models(verdict.complexity, workspace);
        let workflow = select_workflow(verdict.complexity, &models);
        let estimated_cost = estimate_cost(models.len());
        debug!(
            complexity = %verdict.complexity,
            %workflow,
            roster = models.len(),
            source = ?verdict.source,
            "intent classified"
        );

        IntentClassification {
            complexity: verdict.complexity,
            confidence: verdict.confidence,
            reasoning: verdict.reasoning,
            suggested_tools: verdict.suggested_tools,
            workflow,
            models,
            estimated_cost,
            source: verdict.source,
        }
    }

    /// Ordered rule evaluation; `None` means the rules could not decide.
    fn rule_tier(&self, query: &str) -> Option<TierVerdict> {
        let text = query.to_lowercase();
        let word_count = query.split_whitespace().count();

        if word_count < 10 && matches_any(&text, &self.patterns.simple) {
            return Some(TierVerdict {
                complexity: Complexity::Simple,
                confidence: 0.9,
                reasoning: "Short query with simple pattern".into(),
                suggested_tools: vec![],
                source: ClassificationSource::RuleTier,
            });
        }

        if matches_any(&text, &self.patterns.math_code) {
            return Some(TierVerdict {
                complexity: Complexity::Moderate,
                confidence: 0.8,
                reasoning: "Math or code-related query".into(),
                suggested_tools: vec!["calculator".into(), "code_execution".into()],
                source: ClassificationSource::RuleTier,
            });
        }

        if matches_any(&text, &self.patterns.sports) {
            return Some(TierVerdict {
                complexity: Complexity::Moderate,
                confidence: 0.85,
                reasoning: "Sports data query".into(),
                suggested_tools: vec!["sports_data".into(), "web_search".into()],
                source: ClassificationSource::RuleTier,
            });
        }

        if matches_any(&text, &self.patterns.creative) {
            return Some(TierVerdict {
                complexity: Complexity::Complex,
                confidence: 0.8,
                reasoning: "Creative or content production query".into(),
                suggested_tools: vec!["rag_search".into(), "web_search".into()],
                source: ClassificationSource::RuleTier,
            });
        }

        if matches_any(&text, &self.patterns.complex) {
            return Some(TierVerdict {
                complexity: Complexity::Complex,
                confidence: 0.85,
                reasoning: "Complex analytical query requiring multiple perspectives".into(),
                suggested_tools: vec![],
                source: ClassificationSource::RuleTier,
            });
        }

        if matches_any(&text, &self.patterns.web_search) {
            return Some(TierVerdict {
                complexity: Complexity::Moderate,
                confidence: 0.7,
                reasoning: "Query requires current information".into(),
                suggested_tools: vec!["web_search".into()],
                source: ClassificationSource::RuleTier,
            });
        }

        if word_count > 50 {
            return Some(TierVerdict {
                complexity: Complexity::Complex,
                confidence: 0.75,
                reasoning: "Long, detailed query".into(),
                suggested_tools: vec![],
                source: ClassificationSource::RuleTier,
            });
        }

        None
    }

    /// Ask the cheap classifier model; any failure degrades to the moderate
    /// fallback rather than an error.
    async fn model_tier(&self, query: &str) -> TierVerdict {
        let messages = vec![
            ChatMessage::system(prompts::CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user(prompts::classification_request(query)),
        ];

        let response = match self
            .provider
            .complete(
                &self.config.classifier_model,
                &messages,
                self.config.classifier_timeout,
            )
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "classifier model call failed, defaulting to moderate");
                return TierVerdict {
                    complexity: Complexity::Moderate,
                    confidence: 0.3,
                    reasoning: format!(
                        "Classification error: {}",
                        truncate_chars(&error.to_string(), 50)
                    ),
                    suggested_tools: vec![],
                    source: ClassificationSource::Fallback,
                };
            }
        };

        let content = strip_markdown_fence(&response.content);
        match serde_json::from_str::<ClassifierWire>(content) {
            Ok(wire) => TierVerdict {
                complexity: Complexity::parse_lenient(
                    wire.complexity.as_deref().unwrap_or("moderate"),
                ),
                confidence: wire.confidence.unwrap_or(0.7),
                reasoning: wire
                    .reasoning
                    .unwrap_or_else(|| "LLM classification".into()),
                suggested_tools: wire.tools_needed,
                source: ClassificationSource::ModelTier,
            },
            Err(error) => {
                warn!(%error, "classifier returned invalid JSON, defaulting to moderate");
                TierVerdict {
                    complexity: Complexity::Moderate,
                    confidence: 0.3,
                    reasoning: "LLM returned invalid JSON, defaulting to moderate".into(),
                    suggested_tools: vec![],
                    source: ClassificationSource::Fallback,
                }
            }
        }
    }

    /// Roster selection: pinned workspace rosters beat complexity defaults.
    pub fn route_models(&self, complexity: Complexity, workspace: &str) -> Vec<String> {
        let policy = self.policies.get(workspace);
        if policy.pin_roster {
            return policy.default_models.clone();
        }

        match complexity {
            Complexity::Simple => self.config.tier_rosters.simple.clone(),
            Complexity::Moderate => self.config.tier_rosters.moderate.clone(),
            Complexity::Complex => self.config.tier_rosters.complex.clone(),
            Complexity::Expert => self.config.council_models.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    fn router_with(provider: MockProvider) -> IntentRouter {
        IntentRouter::new(
            Arc::new(provider),
            EngineConfig::default(),
            PolicyStore::builtin(),
        )
    }

    /// Rule-tier hits must never touch the provider.
    fn rule_only_router() -> IntentRouter {
        router_with(MockProvider::failing())
    }

    #[tokio::test]
    async fn short_definition_query_is_simple_and_quick() {
        let router = rule_only_router();
        let intent = router.classify("What is Rust?", "General").await;

        assert_eq!(intent.complexity, Complexity::Simple);
        assert_eq!(intent.workflow, Workflow::Quick);
        assert_eq!(intent.models.len(), 1);
        assert!((intent.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(intent.source, ClassificationSource::RuleTier);
    }

    #[tokio::test]
    async fn bare_arithmetic_is_simple() {
        let router = rule_only_router();
        let intent = router.classify("2 + 2", "General").await;
        assert_eq!(intent.complexity, Complexity::Simple);
    }

    #[tokio::test]
    async fn math_query_suggests_calculator_and_dual_check() {
        let router = rule_only_router();
        let intent = router
            .classify("Please calculate the compound interest over ten years", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Moderate);
        assert_eq!(
            intent.suggested_tools,
            vec!["calculator".to_string(), "code_execution".to_string()]
        );
        // moderate with exactly two models
        assert_eq!(intent.workflow, Workflow::DualCheck);
        assert_eq!(intent.models.len(), 2);
    }

    #[tokio::test]
    async fn sports_terms_route_to_sports_tools() {
        let router = rule_only_router();
        let intent = router
            .classify("Give me the spread and odds for tonight", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Moderate);
        assert_eq!(
            intent.suggested_tools,
            vec!["sports_data".to_string(), "web_search".to_string()]
        );
    }

    #[tokio::test]
    async fn content_production_is_complex_deliberation() {
        let router = rule_only_router();
        let intent = router
            .classify("Write a blog post about coffee culture in Portland", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Complex);
        assert_eq!(intent.workflow, Workflow::Deliberation);
        assert_eq!(intent.models.len(), 3);
        assert_eq!(
            intent.suggested_tools,
            vec!["rag_search".to_string(), "web_search".to_string()]
        );
    }

    #[tokio::test]
    async fn analytical_query_is_complex_without_tools() {
        let router = rule_only_router();
        let intent = router
            .classify(
                "Compare the long-term maintenance costs of microservices versus monoliths",
                "General",
            )
            .await;

        assert_eq!(intent.complexity, Complexity::Complex);
        assert!(intent.suggested_tools.is_empty());
        assert!((intent.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn current_info_query_suggests_web_search() {
        let router = rule_only_router();
        let intent = router
            .classify("Summarize the most recent developments in fusion power funding", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Moderate);
        assert_eq!(intent.suggested_tools, vec!["web_search".to_string()]);
        assert!((intent.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn very_long_query_is_complex() {
        let router = rule_only_router();
        let query = "alpha ".repeat(60);
        let intent = router.classify(&query, "General").await;
        assert_eq!(intent.complexity, Complexity::Complex);
        assert!((intent.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn ambiguous_query_uses_model_tier() {
        let provider = MockProvider::new().with_reply(
            "google/gemini-2.5-flash",
            r#"{"complexity": "expert", "reasoning": "multi-domain question", "tools_needed": ["web_search"], "confidence": 0.9}"#,
        );
        let router = router_with(provider);
        let intent = router
            .classify("Tell me about the implications of the treaty", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Expert);
        assert_eq!(intent.workflow, Workflow::ExpertPanel);
        assert_eq!(intent.models.len(), 4);
        assert_eq!(intent.source, ClassificationSource::ModelTier);
        assert!((intent.estimated_cost - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn model_tier_unwraps_fenced_json() {
        let provider = MockProvider::new().with_reply(
            "google/gemini-2.5-flash",
            "```json\n{\"complexity\": \"complex\", \"reasoning\": \"layered\", \"tools_needed\": [], \"confidence\": 0.8}\n```",
        );
        let router = router_with(provider);
        let intent = router
            .classify("Thoughts on the whole situation overall", "General")
            .await;
        assert_eq!(intent.complexity, Complexity::Complex);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_moderate() {
        let router = rule_only_router();
        let intent = router
            .classify("Tell me about the implications of the treaty", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Moderate);
        assert!((intent.confidence - 0.3).abs() < f64::EPSILON);
        assert_eq!(intent.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_moderate() {
        let provider =
            MockProvider::new().with_reply("google/gemini-2.5-flash", "not json at all");
        let router = router_with(provider);
        let intent = router
            .classify("Tell me about the implications of the treaty", "General")
            .await;

        assert_eq!(intent.complexity, Complexity::Moderate);
        assert_eq!(intent.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn pinned_workspace_roster_beats_complexity() {
        let router = rule_only_router();
        // math pattern → moderate, but The Quant pins its two-model roster
        let intent = router
            .classify("Calculate the expected value of this parlay", "The Quant")
            .await;

        assert_eq!(
            intent.models,
            vec![
                "anthropic/claude-sonnet-4.5".to_string(),
                "openai/gpt-5.1".to_string()
            ]
        );
        assert_eq!(intent.workflow, Workflow::DualCheck);
    }

    #[test]
    fn route_models_pins_wooster_to_full_council() {
        let router = rule_only_router();
        let roster = router.route_models(Complexity::Simple, "Wooster");
        assert_eq!(roster.len(), 4);
    }

    #[test]
    fn workflow_mapping_covers_all_tiers() {
        let two = vec!["a".to_string(), "b".to_string()];
        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        assert_eq!(select_workflow(Complexity::Simple, &two), Workflow::Quick);
        assert_eq!(
            select_workflow(Complexity::Moderate, &two),
            Workflow::DualCheck
        );
        assert_eq!(
            select_workflow(Complexity::Moderate, &three),
            Workflow::Deliberation
        );
        assert_eq!(
            select_workflow(Complexity::Complex, &three),
            Workflow::Deliberation
        );
        assert_eq!(
            select_workflow(Complexity::Expert, &three),
            Workflow::ExpertPanel
        );
    }

    #[test]
    fn complexity_parses_leniently() {
        assert_eq!(Complexity::parse_lenient("EXPERT"), Complexity::Expert);
        assert_eq!(Complexity::parse_lenient("nonsense"), Complexity::Moderate);
        assert_eq!(Complexity::Complex.to_string(), "complex");
        assert_eq!(Workflow::DualCheck.to_string(), "dual_check");
    }

    #[test]
    fn fence_stripping_handles_plain_and_tagged() {
        assert_eq!(strip_markdown_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_markdown_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn cost_rounds_to_three_decimals() {
        assert!((estimate_cost(3) - 0.015).abs() < 1e-9);
        assert!((estimate_cost(4) - 0.02).abs() < 1e-9);
    }
}
