//! The three-stage deliberation protocol.
//!
//! Stage 1 fans the query out to the roster, stage 2 has every roster model
//! rank the anonymized stage-1 responses, stage 3 hands the material to a
//! chairman model for one definitive answer. [`CouncilEngine::run_adaptive`]
//! sits in front of the stages: it classifies the query, runs tool
//! augmentation, and picks the roster, workflow, and synthesis budget from
//! the workspace policy.
//!
//! Single-model failures never abort a stage. A run only fails hard when
//! there is no roster at all.

pub mod prompts;
pub mod ranking;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::policy::{PolicyStore, SynthesisBudget};
use crate::provider::{complete_many, CapabilityProvider, ChatMessage, TokenUsage};
use crate::router::{IntentClassification, IntentRouter, Workflow};
use crate::tools::runner::{ToolInvocation, ToolRunner};
use crate::tools::ToolRegistry;

pub use ranking::{aggregate_rankings, borda_scores, parse_ranking, AggregateRanking};

/// Synthesis text when the chairman call fails.
const SYNTHESIS_FAILURE_NOTICE: &str = "Error: Unable to generate final synthesis.";
/// Outcome text when every stage-1 model failed.
const ALL_MODELS_FAILED_NOTICE: &str = "All models failed to respond. Please try again.";
/// Stage-2 block under the minimal budget.
const RANKINGS_OMITTED_NOTE: &str = "(Rankings omitted for efficiency)";
/// Title used when title generation fails.
const FALLBACK_TITLE: &str = "New Conversation";

/// Hard failures callers must handle. Tolerated per-model failures never
/// show up here; they degrade inside the run.
#[derive(Debug, Error)]
pub enum CouncilError {
    #[error("no models available to run")]
    NoModels,
}

pub type CouncilResult<T> = Result<T, CouncilError>;

// ───────────────────────── Data model ─────────────────────────

/// Stage-1 output from one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Provider-reported reasoning trace, when the model emits one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Stage-2 ballot from one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSubmission {
    pub model: String,
    /// Full ranker output, kept for the chairman and for audit.
    pub raw_text: String,
    /// Labels in rank order, best first. Empty when nothing parsed.
    pub parsed_ranking: Vec<String>,
}

/// Stage-3 output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub model: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Run-level context attached to every outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilMetadata {
    /// Correlation id for logs, fresh per run.
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    /// Resolved workspace name (the policy that applied).
    #[serde(default)]
    pub workspace: String,
    pub workflow: Workflow,
    /// Anonymized label to model identity, filled when stage 2 ran.
    #[serde(default)]
    pub label_to_model: HashMap<String, String>,
    #[serde(default)]
    pub aggregate_rankings: Vec<AggregateRanking>,
    /// Tools whose output reached the council, in execution order.
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub tool_results: Vec<ToolInvocation>,
    /// Routing decision snapshot when the classifier ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentClassification>,
    /// Caller-supplied context, echoed back untouched.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl CouncilMetadata {
    /// Fresh metadata with a new request id and the current time.
    pub fn new(workflow: Workflow) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            workspace: String::new(),
            workflow,
            label_to_model: HashMap::new(),
            aggregate_rankings: Vec::new(),
            tools_used: Vec::new(),
            tool_results: Vec::new(),
            intent: None,
            context: Map::new(),
        }
    }
}

/// Everything one deliberation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilOutcome {
    pub stage1: Vec<ModelResponse>,
    pub stage2: Vec<RankingSubmission>,
    pub synthesis: SynthesisResult,
    pub metadata: CouncilMetadata,
}

/// One deliberation request. Everything beyond the query is optional;
/// unset fields fall back to intent routing and workspace defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliberationRequest {
    pub query: String,
    /// Workspace whose policy applies; unknown names resolve to `General`.
    #[serde(default)]
    pub workspace: String,
    /// Roster override; wins over intent routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    /// Workflow override; wins over intent routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    /// Tool suggestion override; wins over the classifier's suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_tools: Option<Vec<String>>,
    /// Opaque caller context; forwarded to tools and echoed in metadata.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl DeliberationRequest {
    pub fn new(query: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            workspace: workspace.into(),
            ..Self::default()
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.suggested_tools = Some(tools);
        self
    }
}

// ───────────────────────── Engine ─────────────────────────

/// Routing, tool augmentation, and the staged protocol behind one entry
/// point. All collaborators are injected; cloning the engine is not needed,
/// share it behind an `Arc` if several tasks deliberate concurrently.
pub struct CouncilEngine {
    provider: Arc<dyn CapabilityProvider>,
    config: EngineConfig,
    policies: PolicyStore,
    router: IntentRouter,
    tools: ToolRunner,
}

impl CouncilEngine {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        config: EngineConfig,
        policies: PolicyStore,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let router = IntentRouter::new(provider.clone(), config.clone(), policies.clone());
        let tools = ToolRunner::new(registry);
        Self {
            provider,
            config,
            policies,
            router,
            tools,
        }
    }

    /// Stage 1: fan the query out to every roster model.
    ///
    /// The result keeps roster order; models that fail are dropped after a
    /// warning, so the list may be shorter than the roster.
    pub async fn collect_responses(&self, query: &str, models: &[String]) -> Vec<ModelResponse> {
        let messages = vec![ChatMessage::user(query)];
        let replies = complete_many(
            &*self.provider,
            models,
            &messages,
            self.config.generation_timeout,
        )
        .await;

        let responses: Vec<ModelResponse> = models
            .iter()
            .zip(replies)
            .filter_map(|(model, reply)| {
                reply.map(|completion| ModelResponse {
                    model: model.clone(),
                    response: completion.content,
                    usage: completion.usage,
                    reasoning: completion.reasoning,
                })
            })
            .collect();

        info!(
            requested = models.len(),
            answered = responses.len(),
            "stage 1 complete"
        );
        responses
    }

    /// Stage 2: every roster model ranks the anonymized stage-1 responses.
    ///
    /// Labels are assigned in stage-1 order and recorded in the returned map
    /// before any call goes out. The prompt is built once, so every ranker
    /// sees identical material. Models whose stage-1 call failed still get
    /// a ballot. Skipped entirely (empty submissions, empty map) when there
    /// are fewer than two responses to compare.
    pub async fn collect_rankings(
        &self,
        query: &str,
        stage1: &[ModelResponse],
        models: &[String],
    ) -> (Vec<RankingSubmission>, HashMap<String, String>) {
        if stage1.len() < 2 {
            info!(responses = stage1.len(), "skipping peer ranking");
            return (Vec::new(), HashMap::new());
        }

        let labels: Vec<String> = (0..stage1.len())
            .map(|i| format!("Response {}", (b'A' + i as u8) as char))
            .collect();
        let label_to_model: HashMap<String, String> = labels
            .iter()
            .zip(stage1)
            .map(|(label, response)| (label.clone(), response.model.clone()))
            .collect();

        let responses_text = labels
            .iter()
            .zip(stage1)
            .map(|(label, response)| format!("{label}:\n{}", response.response))
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = vec![ChatMessage::user(prompts::ranking_prompt(
            query,
            &responses_text,
        ))];
        let replies = complete_many(
            &*self.provider,
            models,
            &messages,
            self.config.generation_timeout,
        )
        .await;

        let mut submissions = Vec::new();
        for (model, reply) in models.iter().zip(replies) {
            let Some(completion) = reply else { continue };
            let parsed = ranking::parse_ranking(&completion.content);
            if parsed.is_empty() {
                warn!(model = %model, "ballot text contained no recognizable ranking");
            }
            submissions.push(RankingSubmission {
                model: model.clone(),
                raw_text: completion.content,
                parsed_ranking: parsed,
            });
        }

        info!(ballots = submissions.len(), "stage 2 complete");
        (submissions, label_to_model)
    }

    /// Stage 3: the chairman folds the material into one answer.
    ///
    /// The budget decides how much stage-1/stage-2 text the chairman sees.
    /// A chairman failure yields the fixed failure notice, not an error.
    pub async fn synthesize(
        &self,
        query: &str,
        stage1: &[ModelResponse],
        stage2: &[RankingSubmission],
        budget: SynthesisBudget,
    ) -> SynthesisResult {
        let selected = select_for_budget(stage1, stage2, budget);
        let stage1_text = selected
            .iter()
            .map(|r| format!("Model: {}\nResponse: {}", r.model, r.response))
            .collect::<Vec<_>>()
            .join("\n\n");
        let stage2_text = if budget == SynthesisBudget::Minimal {
            RANKINGS_OMITTED_NOTE.to_string()
        } else {
            stage2
                .iter()
                .map(|r| format!("Model: {}\nRanking: {}", r.model, r.raw_text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let messages = vec![ChatMessage::user(prompts::chairman_prompt(
            query,
            &stage1_text,
            &stage2_text,
        ))];

        match self
            .provider
            .complete(
                &self.config.chairman_model,
                &messages,
                self.config.generation_timeout,
            )
            .await
        {
            Ok(completion) => SynthesisResult {
                model: self.config.chairman_model.clone(),
                response: completion.content,
                usage: completion.usage,
            },
            Err(error) => {
                warn!(%error, chairman = %self.config.chairman_model, "synthesis failed");
                SynthesisResult {
                    model: self.config.chairman_model.clone(),
                    response: SYNTHESIS_FAILURE_NOTICE.to_string(),
                    usage: None,
                }
            }
        }
    }

    /// Run the staged protocol for an already-decided roster and shape.
    ///
    /// Shape guards match on workflow AND survivor count, so a `Quick` run
    /// that somehow carries several models falls through to the full
    /// pipeline instead of dropping responses.
    pub async fn run_with_workflow(
        &self,
        query: &str,
        models: &[String],
        workflow: Workflow,
        budget: SynthesisBudget,
    ) -> CouncilResult<CouncilOutcome> {
        self.run_staged(query, query, models, workflow, budget).await
    }

    /// `user_query` feeds the ranking and synthesis prompts; `council_query`
    /// is what stage-1 models see (the tool-augmented text when tools ran).
    async fn run_staged(
        &self,
        user_query: &str,
        council_query: &str,
        models: &[String],
        workflow: Workflow,
        budget: SynthesisBudget,
    ) -> CouncilResult<CouncilOutcome> {
        if models.is_empty() {
            return Err(CouncilError::NoModels);
        }

        info!(%workflow, %budget, roster = models.len(), "starting deliberation");
        let stage1 = self.collect_responses(council_query, models).await;

        if stage1.is_empty() {
            warn!("every stage-1 model failed");
            return Ok(CouncilOutcome {
                stage1: Vec::new(),
                stage2: Vec::new(),
                synthesis: SynthesisResult {
                    model: "error".to_string(),
                    response: ALL_MODELS_FAILED_NOTICE.to_string(),
                    usage: None,
                },
                metadata: CouncilMetadata::new(workflow),
            });
        }

        // Quick: the lone response IS the final answer.
        if workflow == Workflow::Quick && stage1.len() == 1 {
            let synthesis = SynthesisResult {
                model: stage1[0].model.clone(),
                response: stage1[0].response.clone(),
                usage: stage1[0].usage,
            };
            return Ok(CouncilOutcome {
                stage1,
                stage2: Vec::new(),
                synthesis,
                metadata: CouncilMetadata::new(workflow),
            });
        }

        // DualCheck: both responses go straight to the chairman.
        if workflow == Workflow::DualCheck && stage1.len() == 2 {
            let synthesis = self.synthesize(user_query, &stage1, &[], budget).await;
            return Ok(CouncilOutcome {
                stage1,
                stage2: Vec::new(),
                synthesis,
                metadata: CouncilMetadata::new(workflow),
            });
        }

        let (stage2, label_to_model) = self.collect_rankings(user_query, &stage1, models).await;
        let aggregate = ranking::aggregate_rankings(&stage2, &label_to_model);
        let synthesis = self.synthesize(user_query, &stage1, &stage2, budget).await;

        let mut metadata = CouncilMetadata::new(workflow);
        metadata.label_to_model = label_to_model;
        metadata.aggregate_rankings = aggregate;
        Ok(CouncilOutcome {
            stage1,
            stage2,
            synthesis,
            metadata,
        })
    }

    /// The adaptive entry point: classify, augment, deliberate.
    ///
    /// Request overrides always win. With classification enabled and no
    /// override, the intent router picks roster and workflow; with it
    /// disabled, the full council deliberates. The synthesis budget comes
    /// from the workspace policy.
    pub async fn run_adaptive(&self, request: DeliberationRequest) -> CouncilResult<CouncilOutcome> {
        let policy = self.policies.get(&request.workspace).clone();

        let needs_routing = request.models.is_none()
            || request.workflow.is_none()
            || request.suggested_tools.is_none();
        let intent = if self.config.flags.intent_classification && needs_routing {
            Some(self.router.classify(&request.query, &request.workspace).await)
        } else {
            None
        };

        let models = match (&request.models, &intent) {
            (Some(models), _) => models.clone(),
            (None, Some(intent)) => intent.models.clone(),
            (None, None) => self.config.full_council(),
        };
        let mut workflow = match (request.workflow, &intent) {
            (Some(workflow), _) => workflow,
            (None, Some(intent)) => intent.workflow,
            (None, None) => Workflow::Deliberation,
        };
        let mut suggested = match (&request.suggested_tools, &intent) {
            (Some(tools), _) => tools.clone(),
            (None, Some(intent)) => intent.suggested_tools.clone(),
            (None, None) => Vec::new(),
        };

        // Workspaces that insist on a chairman pass demote Quick to the
        // full pipeline.
        if workflow == Workflow::Quick && !policy.skip_synthesis_for_simple {
            workflow = Workflow::Deliberation;
        }
        // Auto-invoking workspaces fall back to their own tool list when
        // nothing was suggested.
        if suggested.is_empty() && policy.auto_invoke_tools {
            suggested = policy.tools.clone();
        }

        let mut augmented = None;
        if self.config.flags.tools_enabled && !suggested.is_empty() {
            let result = self
                .tools
                .run(&request.query, &suggested, &request.workspace, &request.context)
                .await;
            // Attempts are recorded in metadata even when every tool failed.
            if !result.tool_results.is_empty() {
                augmented = Some(result);
            }
        }

        let council_query = match &augmented {
            Some(result) if result.success && !result.tools_used.is_empty() => result.text.clone(),
            _ => request.query.clone(),
        };

        let mut outcome = self
            .run_staged(
                &request.query,
                &council_query,
                &models,
                workflow,
                policy.synthesis_budget,
            )
            .await?;

        outcome.metadata.workspace = policy.name.clone();
        outcome.metadata.intent = intent;
        outcome.metadata.context = request.context;
        if let Some(result) = augmented {
            outcome.metadata.tools_used = result.tools_used;
            outcome.metadata.tool_results = result.tool_results;
        }
        Ok(outcome)
    }

    /// Short conversation title from the opening query. Total; every
    /// failure path lands on the fallback title.
    pub async fn generate_title(&self, query: &str) -> String {
        let messages = vec![ChatMessage::user(prompts::title_prompt(query))];
        let reply = self
            .provider
            .complete(&self.config.title_model, &messages, self.config.title_timeout)
            .await;

        let content = match reply {
            Ok(completion) => completion.content,
            Err(error) => {
                warn!(%error, "title generation failed");
                return FALLBACK_TITLE.to_string();
            }
        };

        let title = content
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        if title.is_empty() {
            return FALLBACK_TITLE.to_string();
        }
        if title.chars().count() > 50 {
            let mut cut: String = title.chars().take(47).collect();
            cut.push_str("...");
            return cut;
        }
        title
    }
}

// ───────────────────────── Budget selection ─────────────────────────

/// Choose which stage-1 responses the chairman sees.
fn select_for_budget<'a>(
    stage1: &'a [ModelResponse],
    stage2: &[RankingSubmission],
    budget: SynthesisBudget,
) -> Vec<&'a ModelResponse> {
    match budget {
        SynthesisBudget::Comprehensive => stage1.iter().collect(),
        SynthesisBudget::Standard => {
            if stage1.len() > 2 {
                stage1[..2].iter().collect()
            } else {
                stage1.iter().collect()
            }
        }
        SynthesisBudget::Minimal => {
            let Some(first) = stage1.first() else {
                return Vec::new();
            };
            let scores = ranking::borda_scores(stage2);
            let Some(top_label) = first_max_label(&scores) else {
                warn!("minimal budget with no usable ballots, keeping the first response");
                return vec![first];
            };
            match label_index(top_label) {
                Some(idx) if idx < stage1.len() => vec![&stage1[idx]],
                _ => {
                    warn!(label = %top_label, "top-ranked label is out of range, keeping the first response");
                    vec![first]
                }
            }
        }
    }
}

/// Earliest label holding the maximum score.
fn first_max_label(scores: &[(String, i64)]) -> Option<&str> {
    let mut best: Option<(&str, i64)> = None;
    for (label, score) in scores {
        if best.map_or(true, |(_, top)| *score > top) {
            best = Some((label, *score));
        }
    }
    best.map(|(label, _)| label)
}

/// `Response C` -> 2. `None` for anything but a single uppercase letter.
fn label_index(label: &str) -> Option<usize> {
    let letter = label.strip_prefix("Response ")?;
    let mut chars = letter.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_uppercase() {
        return None;
    }
    Some((c as u8 - b'A') as usize)
}
