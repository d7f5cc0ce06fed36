//! Tool execution and query augmentation.
//!
//! Runs the suggested tools ahead of the council and folds their output into
//! the query the models will see. Tolerant throughout: unknown suggestions
//! are dropped, failed tools are noted in the rendered text, and the worst
//! case is the original query passing through untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{ToolRegistry, ToolResult};

/// One attempted tool call, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    #[serde(flatten)]
    pub result: ToolResult,
    /// Wall time of the execute call.
    #[serde(default)]
    pub duration_ms: u64,
}

/// Output of the pre-council tool pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentedQuery {
    /// Query text the council should see; the original text when no tool ran.
    pub text: String,
    /// Names of tools that succeeded, in execution order.
    pub tools_used: Vec<String>,
    pub tool_results: Vec<ToolInvocation>,
    /// True when at least one tool succeeded, or none were attempted.
    pub success: bool,
}

impl AugmentedQuery {
    fn passthrough(query: &str) -> Self {
        Self {
            text: query.to_string(),
            tools_used: Vec::new(),
            tool_results: Vec::new(),
            success: true,
        }
    }
}

/// Executes suggested tools against a registry and renders the results.
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
}

impl ToolRunner {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Run every registered tool among `suggested` and build the augmented
    /// query. Never fails; individual tool failures are captured in the
    /// result list and noted in the rendered text.
    pub async fn run(
        &self,
        query: &str,
        suggested: &[String],
        workspace: &str,
        context: &Map<String, Value>,
    ) -> AugmentedQuery {
        let available: Vec<&String> = suggested
            .iter()
            .filter(|name| self.registry.has_tool(name))
            .collect();
        if available.is_empty() {
            return AugmentedQuery::passthrough(query);
        }

        let mut invocations = Vec::new();
        let mut tools_used = Vec::new();
        for name in available {
            let params = prepare_params(name, query, workspace, context);
            let started = std::time::Instant::now();
            let result = self.registry.execute(name, &params).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            if result.success {
                tools_used.push(name.clone());
            } else {
                warn!(tool = %name, error = ?result.error, "tool execution failed");
            }
            invocations.push(ToolInvocation {
                tool: name.clone(),
                result,
                duration_ms,
            });
        }
        debug!(
            attempted = invocations.len(),
            succeeded = tools_used.len(),
            "tool pass complete"
        );

        let text = format_augmented_query(query, &invocations);
        let success = !tools_used.is_empty();
        AugmentedQuery {
            text,
            tools_used,
            tool_results: invocations,
            success,
        }
    }
}

/// Build the parameter object each tool expects from the query alone.
fn prepare_params(
    tool_name: &str,
    query: &str,
    workspace: &str,
    context: &Map<String, Value>,
) -> Value {
    match tool_name {
        "calculator" => json!({ "expression": query }),
        "web_search" => json!({
            "query": query,
            "num_results": 5,
            "include_content": false,
        }),
        "code_execution" => {
            let code = context
                .get("code")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .unwrap_or("# No code provided");
            json!({ "code": code })
        }
        "rag_search" => json!({
            "query": query,
            "workspace": workspace,
            "top_k": 5,
            "score_threshold": 0.7,
        }),
        "sports_data" => {
            let lower = query.to_lowercase();
            let mut sport = "americanfootball_ncaaf";
            if contains_any(&lower, &["nfl", "pro football"]) {
                sport = "americanfootball_nfl";
            } else if contains_any(&lower, &["nba", "basketball"]) {
                sport = "basketball_nba";
            } else if contains_any(&lower, &["mlb", "baseball"]) {
                sport = "baseball_mlb";
            }

            let mut data_type = "scores";
            if contains_any(&lower, &["odds", "line", "spread", "betting", "vegas"]) {
                data_type = "odds";
            } else if contains_any(&lower, &["schedule", "upcoming", "next game"]) {
                data_type = "schedule";
            } else if contains_any(&lower, &["stats", "statistics", "record"]) {
                data_type = "stats";
            }

            json!({ "sport": sport, "data_type": data_type })
        }
        _ => json!({ "query": query }),
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Render the attempted tool calls into the text the council will see:
/// the original question, one block per successful tool, then a note listing
/// the failures.
fn format_augmented_query(original_query: &str, invocations: &[ToolInvocation]) -> String {
    if invocations.is_empty() {
        return original_query.to_string();
    }

    let mut parts = vec![format!("User Question: {original_query}"), String::new()];

    let successful: Vec<&ToolInvocation> =
        invocations.iter().filter(|i| i.result.success).collect();
    if !successful.is_empty() {
        parts.push("Additional Context from Tools:".to_string());
        parts.push(String::new());
        for invocation in successful {
            parts.push(format!("--- {} ---", invocation.tool.to_uppercase()));
            render_tool_block(&mut parts, &invocation.tool, &invocation.result.data);
            parts.push(String::new());
        }
    }

    let failed: Vec<&ToolInvocation> =
        invocations.iter().filter(|i| !i.result.success).collect();
    if !failed.is_empty() {
        parts.push("Note: Some tools failed:".to_string());
        for invocation in &failed {
            parts.push(format!(
                "- {}: {}",
                invocation.tool,
                invocation.result.error.as_deref().unwrap_or("Unknown error")
            ));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}

fn render_tool_block(parts: &mut Vec<String>, tool: &str, data: &Value) {
    match tool {
        "calculator" => parts.push(format!("Calculation Result: {}", plain(data))),

        "web_search" => {
            parts.push("Search Results:".to_string());
            if let Some(items) = data.as_array() {
                for item in items.iter().take(3) {
                    if item.get("title").is_some() {
                        parts.push(format!("- {}", field_str(item, "title", "")));
                        let snippet = item
                            .get("snippet")
                            .or_else(|| item.get("content"))
                            .map(plain)
                            .unwrap_or_default();
                        parts.push(format!("  {}", take_chars(&snippet, 200)));
                        parts.push(format!("  URL: {}", field_str(item, "url", "N/A")));
                    }
                }
            }
        }

        "rag_search" => {
            if let Some(results) = data.get("results").and_then(Value::as_array) {
                parts.push(format!("Found {} relevant document(s):", results.len()));
                for doc in results {
                    parts.push(format!(
                        "- [{}] (Relevance: {})",
                        field_str(doc, "title", ""),
                        field_str(doc, "relevance_score", "")
                    ));
                    let content = field_str(doc, "content", "");
                    parts.push(format!("  {}...", take_chars(&content, 300)));
                }
            } else {
                parts.push(field_str(data, "message", "No results"));
            }
        }

        "code_execution" => {
            if let Some(stdout) = data.get("stdout").and_then(Value::as_str) {
                if !stdout.is_empty() {
                    parts.push(format!("Output: {stdout}"));
                }
            }
            if let Some(value) = data.get("return_value") {
                if !value.is_null() {
                    parts.push(format!("Return Value: {}", plain(value)));
                }
            }
            if let Some(stderr) = data.get("stderr").and_then(Value::as_str) {
                if !stderr.is_empty() {
                    parts.push(format!("Errors: {stderr}"));
                }
            }
        }

        "sports_data" => {
            parts.push(format!("Source: {}", field_str(data, "source", "unknown")));
            if let Some(games) = data.get("games").and_then(Value::as_array) {
                let count = data.get("count").and_then(Value::as_u64).unwrap_or(0);
                parts.push(format!("Found {count} game(s):"));
                for game in games.iter().take(5) {
                    parts.push(format!("- {}", field_str(game, "name", "Unknown game")));
                    if game.get("home_score").is_some() {
                        parts.push(format!(
                            "  Score: {} {} - {} {}",
                            field_str(game, "away_team", "Away"),
                            field_str(game, "away_score", "0"),
                            field_str(game, "home_team", "Home"),
                            field_str(game, "home_score", "0"),
                        ));
                    }
                    if let Some(status) = game.get("status") {
                        parts.push(format!("  Status: {}", plain(status)));
                    }
                    if let Some(books) = game.get("bookmakers").and_then(Value::as_array) {
                        parts.push(format!(
                            "  Odds available from {} sportsbook(s)",
                            books.len()
                        ));
                    }
                }
            } else if let Some(upcoming) = data.get("upcoming_games").and_then(Value::as_array) {
                let count = data.get("count").and_then(Value::as_u64).unwrap_or(0);
                parts.push(format!("Found {count} upcoming game(s):"));
                for game in upcoming.iter().take(5) {
                    parts.push(format!(
                        "- {} on {}",
                        field_str(game, "name", "Unknown game"),
                        field_str(game, "date", "TBD"),
                    ));
                }
            } else if let Some(stats) = data.get("stats") {
                parts.push(format!("Team: {}", field_str(stats, "team", "Unknown")));
                parts.push(format!(
                    "Record: {}-{}",
                    field_str(stats, "wins", "0"),
                    field_str(stats, "losses", "0"),
                ));
            }
        }

        // Open registry: tools this renderer has no shape for still surface
        // their payload.
        _ => parts.push(plain(data)),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field_str(obj: &Value, key: &str, default: &str) -> String {
    obj.get(key).map(plain).unwrap_or_else(|| default.to_string())
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
