//! Post-hoc quality scoring of a council outcome.
//!
//! An independent model grades the synthesized answer against the
//! individual stage-1 responses. The pass is optional and total: disabled
//! judging returns a marker evaluation, a provider failure returns neutral
//! scores with the error recorded. Nothing here aborts the caller.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::council::{CouncilOutcome, ModelResponse};
use crate::provider::{CapabilityProvider, ChatMessage};

static ACCURACY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ACCURACY SCORE:\s*(\d+(?:\.\d+)?)").unwrap());
static COMPLETENESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)COMPLETENESS SCORE:\s*(\d+(?:\.\d+)?)").unwrap());
static COHERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)COHERENCE SCORE:\s*(\d+(?:\.\d+)?)").unwrap());
static CONCERNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)CONCERNS:\s*(.*?)(?:RECOMMENDATION:|$)").unwrap());
static RECOMMENDATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RECOMMENDATION:\s*(\w+)").unwrap());
static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)REASONING:\s*(.*?)(?:\n\n|$)").unwrap());

/// Judge verdict, uppercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    #[default]
    Approve,
    Revise,
    Escalate,
}

impl Recommendation {
    /// Parse a verdict token leniently; anything unrecognized approves.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "REVISE" => Recommendation::Revise,
            "ESCALATE" => Recommendation::Escalate,
            _ => Recommendation::Approve,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Approve => "APPROVE",
            Recommendation::Revise => "REVISE",
            Recommendation::Escalate => "ESCALATE",
        };
        write!(f, "{s}")
    }
}

/// Scores and verdict for one outcome. Each score is on a 0-10 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeEvaluation {
    /// False when judging is switched off; the scores then carry no signal.
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    pub accuracy: f64,
    pub completeness: f64,
    pub coherence: f64,
    /// Mean of the three scores, rounded to 1 decimal.
    pub overall: f64,
    pub concerns: Vec<String>,
    pub recommendation: Recommendation,
    pub reasoning: String,
    /// Provider failure that forced neutral scores, when one happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JudgeEvaluation {
    fn neutral() -> Self {
        Self {
            enabled: true,
            judge_model: None,
            accuracy: 5.0,
            completeness: 5.0,
            coherence: 5.0,
            overall: 5.0,
            concerns: Vec::new(),
            recommendation: Recommendation::Approve,
            reasoning: String::new(),
            error: None,
        }
    }

    fn disabled() -> Self {
        Self {
            enabled: false,
            reasoning: "Judge model evaluation is disabled".to_string(),
            ..Self::neutral()
        }
    }
}

/// Runs the optional judge pass against a configured judge model.
pub struct JudgeEvaluator {
    provider: Arc<dyn CapabilityProvider>,
    config: EngineConfig,
}

impl JudgeEvaluator {
    pub fn new(provider: Arc<dyn CapabilityProvider>, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    /// Grade an outcome. Total: disabled judging and provider failures both
    /// come back as evaluations, never as errors.
    pub async fn evaluate(&self, query: &str, outcome: &CouncilOutcome) -> JudgeEvaluation {
        if !self.config.flags.judge_enabled {
            return JudgeEvaluation::disabled();
        }

        let prompt = evaluation_prompt(query, &outcome.stage1, &outcome.synthesis.response);
        let messages = vec![ChatMessage::user(prompt)];

        match self
            .provider
            .complete(&self.config.judge_model, &messages, self.config.judge_timeout)
            .await
        {
            Ok(completion) => {
                let mut evaluation = parse_evaluation(&completion.content);
                evaluation.judge_model = Some(self.config.judge_model.clone());
                evaluation
            }
            Err(error) => {
                warn!(%error, judge = %self.config.judge_model, "judge evaluation failed");
                JudgeEvaluation {
                    judge_model: Some(self.config.judge_model.clone()),
                    error: Some(error.to_string()),
                    ..JudgeEvaluation::neutral()
                }
            }
        }
    }
}

fn evaluation_prompt(query: &str, stage1: &[ModelResponse], final_answer: &str) -> String {
    let stage1_text = stage1
        .iter()
        .map(|r| format!("Model: {}\nResponse: {}", r.model, r.response))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an independent judge evaluating the quality of a multi-LLM council's response.

**Original Question:**
{query}

**Individual Model Responses (Stage 1):**
{stage1_text}

**Council's Final Answer (Stage 3):**
{final_answer}

**Your Task:**
Evaluate the final answer for:
1. **Accuracy**: Is the information factually correct?
2. **Completeness**: Does it fully address all aspects of the question?
3. **Coherence**: Is it well-structured and easy to understand?
4. **Concerns**: Are there any errors, contradictions, or missing information?

Provide your evaluation in the following format:

ACCURACY SCORE: [0-10]
COMPLETENESS SCORE: [0-10]
COHERENCE SCORE: [0-10]

CONCERNS:
- [List any concerns, or write "None"]

RECOMMENDATION: [APPROVE | REVISE | ESCALATE]
REASONING: [Brief explanation of your recommendation]

Guidelines:
- APPROVE: Response is high quality and ready to send
- REVISE: Minor issues that should be addressed
- ESCALATE: Significant errors or inadequacies requiring major revision
"#
    )
}

/// Pull scores out of free-form judge text. Absent fields fall back to
/// neutral defaults rather than failing the evaluation.
fn parse_evaluation(text: &str) -> JudgeEvaluation {
    let mut evaluation = JudgeEvaluation::neutral();

    if let Some(score) = capture_score(&ACCURACY_RE, text) {
        evaluation.accuracy = score;
    }
    if let Some(score) = capture_score(&COMPLETENESS_RE, text) {
        evaluation.completeness = score;
    }
    if let Some(score) = capture_score(&COHERENCE_RE, text) {
        evaluation.coherence = score;
    }

    if let Some(section) = CONCERNS_RE.captures(text).and_then(|c| c.get(1)) {
        evaluation.concerns = parse_concern_bullets(section.as_str());
    }
    if let Some(token) = RECOMMENDATION_RE.captures(text).and_then(|c| c.get(1)) {
        evaluation.recommendation = Recommendation::parse_lenient(token.as_str());
    }
    if let Some(reason) = REASONING_RE.captures(text).and_then(|c| c.get(1)) {
        evaluation.reasoning = reason.as_str().trim().to_string();
    }

    let mean = (evaluation.accuracy + evaluation.completeness + evaluation.coherence) / 3.0;
    evaluation.overall = (mean * 10.0).round() / 10.0;
    evaluation
}

fn capture_score(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Split a concerns section into bullets, dropping list markers and the
/// usual spellings of "nothing to report".
fn parse_concern_bullets(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| {
            let cleaned = line
                .trim()
                .trim_start_matches(|c| c == '-' || c == '•' || c == '*')
                .trim();
            if cleaned.is_empty() {
                return None;
            }
            let lowered = cleaned.to_ascii_lowercase();
            if matches!(lowered.as_str(), "none" | "n/a" | "no concerns") {
                return None;
            }
            Some(cleaned.to_string())
        })
        .collect()
}
