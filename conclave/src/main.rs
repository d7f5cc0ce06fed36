//! Council deliberation CLI.
//!
//! Puts one query through the adaptive pipeline: intent classification,
//! optional tool augmentation, then the three-stage council protocol
//! (independent answers, anonymized peer ranking, chairman synthesis).
//!
//! Logs go to stderr; the report goes to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Adaptive routing end to end
//! conclave "What caused the 2008 financial crisis?"
//!
//! # Pin the roster and workflow
//! conclave --models openai/gpt-5.1,x-ai/grok-4 --workflow deliberation "Compare Rust and Go"
//!
//! # Workspace policy, judge pass, machine-readable output
//! conclave --workspace "The Quant" --judge --json "Expected value of this parlay?"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use conclave::{
    CouncilEngine, CouncilOutcome, DeliberationRequest, EngineConfig, JudgeEvaluation,
    JudgeEvaluator, OpenRouterProvider, PolicyStore, ToolRegistry, Workflow,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to put to the council
    query: String,

    /// Workspace whose policy governs the run
    #[arg(long, default_value = "General")]
    workspace: String,

    /// Comma-separated roster override (skips intent-routed model selection)
    #[arg(long, value_delimiter = ',')]
    models: Option<Vec<String>>,

    /// Workflow override: quick, dual_check, deliberation, or expert_panel
    #[arg(long)]
    workflow: Option<String>,

    /// TOML file with additional workspace policies
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Run the judge pass on the outcome (overrides ENABLE_JUDGE)
    #[arg(long, default_value_t = false)]
    judge: bool,

    /// Also generate a conversation title for the query
    #[arg(long, default_value_t = false)]
    title: bool,

    /// Emit the full outcome as JSON instead of the text report
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn parse_workflow(raw: &str) -> Result<Workflow> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "quick" => Ok(Workflow::Quick),
        "dual_check" | "dual-check" => Ok(Workflow::DualCheck),
        "deliberation" => Ok(Workflow::Deliberation),
        "expert_panel" | "expert-panel" => Ok(Workflow::ExpertPanel),
        other => bail!(
            "unknown workflow '{other}' (expected quick, dual_check, deliberation, or expert_panel)"
        ),
    }
}

fn print_report(
    outcome: &CouncilOutcome,
    evaluation: Option<&JudgeEvaluation>,
    title: Option<&str>,
) {
    let meta = &outcome.metadata;
    println!("Workflow: {} (workspace: {})", meta.workflow, meta.workspace);
    if let Some(title) = title {
        println!("Title: {title}");
    }
    if let Some(intent) = &meta.intent {
        println!(
            "Intent: {} (confidence {:.2}, est. ${:.3})",
            intent.complexity, intent.confidence, intent.estimated_cost
        );
    }
    if !meta.tools_used.is_empty() {
        println!("Tools: {}", meta.tools_used.join(", "));
    }

    println!();
    println!("Stage 1 ({} responses):", outcome.stage1.len());
    for response in &outcome.stage1 {
        println!(
            "  {} ({} chars)",
            response.model,
            response.response.chars().count()
        );
    }

    if !meta.aggregate_rankings.is_empty() {
        println!();
        println!("Consensus ranking ({} ballots):", outcome.stage2.len());
        for (position, entry) in meta.aggregate_rankings.iter().enumerate() {
            println!(
                "  {}. {} (avg rank {:.2}, {} ballots)",
                position + 1,
                entry.model,
                entry.average_rank,
                entry.rankings_count
            );
        }
    }

    if let Some(evaluation) = evaluation {
        println!();
        match &evaluation.error {
            Some(error) => println!("Judge: unavailable ({error})"),
            None => {
                println!(
                    "Judge: {} (overall {:.1}; accuracy {:.1}, completeness {:.1}, coherence {:.1})",
                    evaluation.recommendation,
                    evaluation.overall,
                    evaluation.accuracy,
                    evaluation.completeness,
                    evaluation.coherence
                );
                for concern in &evaluation.concerns {
                    println!("  concern: {concern}");
                }
            }
        }
    }

    println!();
    println!("Final answer ({}):", outcome.synthesis.model);
    println!("{}", outcome.synthesis.response);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("conclave=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = EngineConfig::from_env();
    if args.judge {
        config.flags.judge_enabled = true;
    }

    let policies = match &args.policies {
        Some(path) => PolicyStore::from_toml_file(path)
            .with_context(|| format!("failed to load policies from {}", path.display()))?,
        None => PolicyStore::builtin(),
    };

    let workflow = args.workflow.as_deref().map(parse_workflow).transpose()?;

    // Tool backends are host-provided; with the stock empty registry,
    // suggested tools pass through without effect.
    let registry = Arc::new(ToolRegistry::new());

    let provider = Arc::new(
        OpenRouterProvider::from_config(&config).context("set OPENROUTER_API_KEY to run")?,
    );

    tracing::info!(workspace = %args.workspace, "starting deliberation");

    let engine = CouncilEngine::new(provider.clone(), config.clone(), policies, registry);

    let mut request = DeliberationRequest::new(args.query.clone(), args.workspace.clone());
    if let Some(models) = args.models.clone() {
        request = request.with_models(models);
    }
    if let Some(workflow) = workflow {
        request = request.with_workflow(workflow);
    }

    let outcome = engine.run_adaptive(request).await?;

    let evaluation = if config.flags.judge_enabled {
        let judge = JudgeEvaluator::new(provider, config);
        Some(judge.evaluate(&args.query, &outcome).await)
    } else {
        None
    };

    let title = if args.title {
        Some(engine.generate_title(&args.query).await)
    } else {
        None
    };

    if args.json {
        #[derive(serde::Serialize)]
        struct Report<'a> {
            outcome: &'a CouncilOutcome,
            #[serde(skip_serializing_if = "Option::is_none")]
            evaluation: Option<&'a JudgeEvaluation>,
            #[serde(skip_serializing_if = "Option::is_none")]
            title: Option<&'a String>,
        }

        let report = Report {
            outcome: &outcome,
            evaluation: evaluation.as_ref(),
            title: title.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&outcome, evaluation.as_ref(), title.as_deref());
    }

    Ok(())
}
