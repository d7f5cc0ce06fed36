//! Adaptive multi-model deliberation.
//!
//! `conclave` routes a query to a roster of language models, has them
//! deliberate in three stages (independent generation, anonymized peer
//! ranking, chairman synthesis), and returns one synthesized answer with the
//! full paper trail. An intent classifier sizes the roster to the query,
//! workspace policies pin rosters, tools, and synthesis budgets, and an
//! optional judge model grades the result afterwards.
//!
//! The crate is a library first; the `conclave` binary wires a small CLI
//! around [`CouncilEngine`]. Everything is injected through
//! [`CapabilityProvider`] and [`ToolRegistry`], so tests run the whole
//! pipeline against in-process mocks.

pub mod config;
pub mod council;
pub mod judge;
pub mod policy;
pub mod provider;
pub mod router;
pub mod tools;

pub use config::{EngineConfig, FeatureFlags, TierRosters};
pub use council::{
    AggregateRanking, CouncilEngine, CouncilError, CouncilMetadata, CouncilOutcome, CouncilResult,
    DeliberationRequest, ModelResponse, RankingSubmission, SynthesisResult,
};
pub use judge::{JudgeEvaluation, JudgeEvaluator, Recommendation};
pub use policy::{PolicyError, PolicyStore, SynthesisBudget, WorkspacePolicy};
pub use provider::{
    CapabilityProvider, ChatMessage, CompletionResponse, MessageRole, MockCall, MockProvider,
    OpenRouterProvider, ProviderError, TokenUsage,
};
pub use router::{
    ClassificationSource, Complexity, IntentClassification, IntentRouter, Workflow,
};
pub use tools::runner::{AugmentedQuery, ToolInvocation, ToolRunner};
pub use tools::{MockTool, ToolCapability, ToolError, ToolRegistry, ToolResult};
