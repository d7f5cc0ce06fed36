//! Tool capability seam and registry.
//!
//! Concrete tool backends live outside this crate; the engine only needs the
//! [`ToolCapability`] contract (name, schema, execute) and a registry to look
//! suggestions up in. Execution is failure-tolerant end to end: a tool that
//! errors produces a failed [`ToolResult`], never a crate error.

pub mod runner;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error("execution failed: {0}")]
    Execution(String),
}

pub type ToolOpResult<T> = Result<T, ToolError>;

/// Outcome of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Contract every tool backend implements.
///
/// `execute` may return `Err` for hard failures; the registry converts those
/// into failed [`ToolResult`]s so callers above never see a raw error.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the parameter object, in function-calling shape.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: &Value) -> ToolOpResult<ToolResult>;
}

/// Registered tools, looked up by name. Insertion order is preserved so the
/// generated prompt text is stable.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolCapability>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn ToolCapability>) -> ToolOpResult<()> {
        let name = tool.name().to_string();
        if self.has_tool(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        info!(tool = %name, "registered tool");
        self.tools.push(tool);
        Ok(())
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolCapability>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn list_tools(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Human-readable tool descriptions for prompt embedding:
    /// `- name(param*: type, ...): description`, `*` marking required keys.
    pub fn tools_prompt(&self) -> String {
        if self.tools.is_empty() {
            return "No tools available.".to_string();
        }

        let mut lines = vec!["Available tools:".to_string()];
        for tool in &self.tools {
            let schema = tool.parameters_schema();
            let required: Vec<String> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let params = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(param, prop)| {
                            let marker = if required.iter().any(|r| r == param) {
                                "*"
                            } else {
                                ""
                            };
                            let ty = prop
                                .get("type")
                                .and_then(Value::as_str)
                                .unwrap_or("any");
                            format!("{param}{marker}: {ty}")
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            lines.push(format!(
                "- {}({}): {}",
                tool.name(),
                params,
                tool.description()
            ));
        }
        lines.join("\n")
    }

    /// Execute a registered tool. Unknown names and hard execution errors
    /// both come back as failed results.
    pub async fn execute(&self, name: &str, params: &Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::fail(format!(
                "Tool '{}' not found. Available tools: {}",
                name,
                self.list_tools().join(", ")
            ));
        };
        match tool.execute(params).await {
            Ok(result) => result,
            Err(error) => ToolResult::fail(format!("Unexpected error: {error}"))
                .with_metadata("error_type", Value::String("ToolError".into())),
        }
    }
}

// ───────────────────────── Mock tool ─────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[allow(dead_code)]
struct MockToolParams {
    /// Free-text input forwarded to the tool.
    query: String,
}

enum MockBehavior {
    Answer(Value),
    FailResult(String),
    HardError(String),
}

/// Deterministic in-process tool for tests.
///
/// Records every parameter object it was called with; behavior is fixed at
/// construction: answer with canned data, return a failed result, or return
/// a hard error (exercising the registry's wrapping).
pub struct MockTool {
    name: String,
    behavior: MockBehavior,
    calls: std::sync::Mutex<Vec<Value>>,
}

impl MockTool {
    pub fn answering(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            behavior: MockBehavior::Answer(data),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: MockBehavior::FailResult(error.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn erroring(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: MockBehavior::HardError(error.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolCapability for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted tool used in tests"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(MockToolParams))
            .unwrap_or_else(|_| Value::Object(Map::new()))
    }

    async fn execute(&self, params: &Value) -> ToolOpResult<ToolResult> {
        self.calls.lock().unwrap().push(params.clone());
        match &self.behavior {
            MockBehavior::Answer(data) => Ok(ToolResult::ok(data.clone())),
            MockBehavior::FailResult(error) => Ok(ToolResult::fail(error.clone())),
            MockBehavior::HardError(error) => Err(ToolError::Execution(error.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with(tools: Vec<Arc<dyn ToolCapability>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(MockTool::answering("calculator", json!(4))))
            .unwrap();
        let err = registry
            .register(Arc::new(MockTool::answering("calculator", json!(5))))
            .unwrap_err();
        assert!(matches!(err, ToolError::DuplicateTool(name) if name == "calculator"));
    }

    #[tokio::test]
    async fn unknown_tool_yields_failed_result() {
        let registry = registry_with(vec![Arc::new(MockTool::answering(
            "calculator",
            json!(4),
        ))]);
        let result = registry.execute("web_search", &json!({})).await;
        assert!(!result.success);
        let msg = result.error.unwrap();
        assert!(msg.contains("'web_search' not found"));
        assert!(msg.contains("calculator"));
    }

    #[tokio::test]
    async fn hard_errors_are_wrapped_into_failed_results() {
        let registry = registry_with(vec![Arc::new(MockTool::erroring(
            "calculator",
            "division by zero",
        ))]);
        let result = registry.execute("calculator", &json!({"query": "1/0"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("division by zero"));
        assert_eq!(result.metadata["error_type"], json!("ToolError"));
    }

    #[tokio::test]
    async fn successful_execution_passes_data_through() {
        let registry = registry_with(vec![Arc::new(MockTool::answering(
            "calculator",
            json!({"result": 4}),
        ))]);
        let result = registry.execute("calculator", &json!({"query": "2+2"})).await;
        assert!(result.success);
        assert_eq!(result.data["result"], json!(4));
    }

    #[test]
    fn tools_prompt_lists_required_params() {
        let registry = registry_with(vec![Arc::new(MockTool::answering("calculator", json!(4)))]);
        let prompt = registry.tools_prompt();
        assert!(prompt.starts_with("Available tools:"));
        assert!(prompt.contains("- calculator(query*: string): Scripted tool used in tests"));
    }

    #[test]
    fn empty_registry_prompt() {
        assert_eq!(ToolRegistry::new().tools_prompt(), "No tools available.");
    }
}
