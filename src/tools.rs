//! Tool Executor (C5): dispatches parsed tool calls to registered handlers
//! and enforces authorization level against the calling agent's type.
//!
//! Authorization levels, the structured error object, and the
//! `tool_information` introspection tool give an agent a chance to
//! self-correct a bad tool call instead of aborting the cycle.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::agent::AgentType;
use crate::constants::TOOL_ACTION_SYNONYMS;
use crate::Result;

const MAX_ALL_USAGE_CHARS: usize = 8000;
const TRUNCATION_MARKER: &str = "\n\n[... Tool usage details truncated due to length limit ...]";
const CLOSE_MATCH_CUTOFF: f64 = 0.6;

pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Minimum agent type allowed to call a tool. Admin may call any tool; PM may
/// call `Pm` and `Worker` level tools; Worker may call only `Worker` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLevel {
    Worker,
    Pm,
    Admin,
}

impl AuthLevel {
    fn permits(self, caller: AgentType) -> bool {
        match caller {
            AgentType::Admin => true,
            AgentType::Pm => matches!(self, AuthLevel::Pm | AuthLevel::Worker),
            AgentType::Worker => matches!(self, AuthLevel::Worker),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AuthLevel::Worker => "worker",
            AuthLevel::Pm => "pm",
            AuthLevel::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorType {
    InvalidAction,
    MissingParameter,
    InvalidParameter,
    AuthorizationError,
    ExecutionError,
    ToolNotFound,
}

/// Agent-addressed, structured error returned in place of a tool result.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub error_type: ToolErrorType,
    pub tool_name: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub corrected_examples: Vec<String>,
    pub alternative_tools: Vec<String>,
}

impl ToolError {
    fn new(error_type: ToolErrorType, tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type,
            tool_name: tool_name.into(),
            message: message.into(),
            suggestions: Vec::new(),
            corrected_examples: Vec::new(),
            alternative_tools: Vec::new(),
        }
    }

    /// Renders the error as the plain-text block handed back to the agent.
    pub fn format_for_agent(&self) -> String {
        let mut out = format!("[Tool Error: {}]\n{}", self.tool_name, self.message);

        if !self.suggestions.is_empty() {
            out.push_str("\n\n[Suggestions]");
            for (i, s) in self.suggestions.iter().take(3).enumerate() {
                out.push_str(&format!("\n{}. {}", i + 1, s));
            }
        }

        if let Some(example) = self.corrected_examples.first() {
            out.push_str("\n\n[Correct Usage Example]\n");
            out.push_str(example);
        }

        if !self.alternative_tools.is_empty() {
            out.push_str(&format!("\n\n[Alternative Tools]: {}", self.alternative_tools.join(", ")));
        }

        out
    }
}

/// Close matches (normalized similarity >= cutoff) against a candidate set,
/// ranked highest-first, at most `n`. Stands in for `difflib.get_close_matches`.
fn close_matches(target: &str, candidates: &[String], n: usize) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .map(|c| (strsim::normalized_levenshtein(target, c), c))
        .filter(|(score, _)| *score >= CLOSE_MATCH_CUTOFF)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(n).map(|(_, c)| c.clone()).collect()
}

/// Looks up the static global synonym table, filtered to values that are
/// actually valid for this tool (when a valid-action list is known).
fn synonym_suggestions(attempted: &str, valid_actions: &[String]) -> Vec<String> {
    let attempted = attempted.to_lowercase();
    TOOL_ACTION_SYNONYMS
        .iter()
        .filter(|(key, _)| *key == attempted)
        .map(|(_, value)| value.to_string())
        .filter(|value| valid_actions.is_empty() || valid_actions.iter().any(|a| a == value))
        .collect()
}

/// A registered tool: metadata plus its async handler.
#[derive(Clone)]
pub struct ToolDef {
    name: String,
    auth_level: AuthLevel,
    summary: String,
    description: String,
    /// Valid values for the tool's `action` parameter, used for invalid-action
    /// suggestions. Empty for tools without an action-dispatch parameter.
    valid_actions: Vec<String>,
    input_schema: Value,
    handler: ToolHandler,
}

impl ToolDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn auth_level(&self) -> AuthLevel {
        self.auth_level
    }

    /// Usage block shown by `tool_information`'s `get_info` action.
    pub fn detailed_usage(&self) -> String {
        let actions = if self.valid_actions.is_empty() {
            String::new()
        } else {
            format!("\nValid actions: {}", self.valid_actions.join(", "))
        };
        format!(
            "Tool: {}\nAuth level: {}\nDescription: {}{}\nParameters: {}",
            self.name,
            self.auth_level.as_str(),
            self.description,
            actions,
            self.input_schema
        )
    }
}

/// Builder for a [`ToolDef`].
pub struct ToolBuilder {
    name: String,
    auth_level: AuthLevel,
    summary: String,
    description: String,
    valid_actions: Vec<String>,
    input_schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            name: name.into(),
            auth_level: AuthLevel::Worker,
            summary: description.clone(),
            description,
            valid_actions: Vec::new(),
            input_schema: serde_json::json!({}),
        }
    }

    pub fn auth_level(mut self, level: AuthLevel) -> Self {
        self.auth_level = level;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn actions(mut self, actions: &[&str]) -> Self {
        self.valid_actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> ToolDef
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        ToolDef {
            name: self.name,
            auth_level: self.auth_level,
            summary: self.summary,
            description: self.description,
            valid_actions: self.valid_actions,
            input_schema: self.input_schema,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Name-keyed tool registry with authorization-aware dispatch.
#[derive(Clone, Default)]
pub struct ToolExecutor {
    tools: HashMap<String, ToolDef>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ToolDef) {
        self.tools.insert(def.name.clone(), def);
    }

    /// All registered tool names, used by the cycle handler's output parser
    /// to scan an assistant response for tool-call tags.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    fn authorized_tools(&self, caller_type: AgentType) -> Vec<&ToolDef> {
        let mut defs: Vec<&ToolDef> = self
            .tools
            .values()
            .filter(|t| t.auth_level.permits(caller_type))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatches a parsed tool call. `tool_information` is handled directly
    /// since it needs to see the whole registry rather than its own handler.
    pub async fn execute_tool(
        &self,
        caller_type: AgentType,
        name: &str,
        args: Value,
    ) -> std::result::Result<Value, ToolError> {
        if name == "tool_information" {
            return self.handle_tool_information(caller_type, &args);
        }

        let Some(def) = self.tools.get(name) else {
            return Err(self.tool_not_found_error(name));
        };

        if !def.auth_level.permits(caller_type) {
            return Err(ToolError::new(
                ToolErrorType::AuthorizationError,
                name,
                format!(
                    "Agent type '{caller_type:?}' is not authorized to call tool '{name}' (requires level '{}').",
                    def.auth_level.as_str()
                ),
            ));
        }

        if !def.valid_actions.is_empty() {
            let action = args.get("action").and_then(Value::as_str);
            match action {
                None => {
                    return Err(ToolError::new(
                        ToolErrorType::InvalidAction,
                        name,
                        format!("Missing 'action' parameter for tool '{name}'."),
                    ));
                }
                Some(action) if !def.valid_actions.iter().any(|a| a == action) => {
                    return Err(self.invalid_action_error(def, action));
                }
                _ => {}
            }
        }

        (def.handler)(args).await.map_err(|e| {
            ToolError::new(ToolErrorType::ExecutionError, name, e.to_string())
        })
    }

    fn tool_not_found_error(&self, name: &str) -> ToolError {
        let all_names: Vec<String> = self.tools.keys().cloned().collect();
        let matches = close_matches(name, &all_names, 3);

        let mut error = ToolError::new(
            ToolErrorType::ToolNotFound,
            name,
            format!("Tool '{name}' not found or not accessible."),
        );
        error
            .suggestions
            .push("Use 'tool_information' with action 'list_tools' to see all available tools.".to_string());
        if !matches.is_empty() {
            error
                .suggestions
                .push(format!("Did you mean: {}?", matches.join(", ")));
            error.alternative_tools = matches;
        }
        error
    }

    fn invalid_action_error(&self, def: &ToolDef, attempted: &str) -> ToolError {
        let mut error = ToolError::new(ToolErrorType::InvalidAction, &def.name, String::new());

        let matches = close_matches(attempted, &def.valid_actions, 3);
        if let Some(primary) = matches.first() {
            error.message = format!(
                "Invalid action '{attempted}' for tool '{}'. Did you mean '{primary}'? Valid actions: {}.",
                def.name,
                def.valid_actions.join(", ")
            );
            error.corrected_examples.push(format!(
                "<{name}><action>{primary}</action></{name}>",
                name = def.name
            ));
            error.suggestions.push(format!("Try using '{primary}' instead of '{attempted}'."));
        } else {
            error.message = format!(
                "Invalid action '{attempted}' for tool '{}'. Valid actions: {}.",
                def.name,
                def.valid_actions.join(", ")
            );
        }

        let synonyms = synonym_suggestions(attempted, &def.valid_actions);
        if !synonyms.is_empty() {
            error
                .suggestions
                .push(format!("For '{attempted}', you might want: {}.", synonyms.join(", ")));
        }

        error
    }

    fn handle_tool_information(
        &self,
        caller_type: AgentType,
        args: &Value,
    ) -> std::result::Result<Value, ToolError> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or_default();

        match action {
            "list_tools" => {
                let lines: Vec<String> = self
                    .authorized_tools(caller_type)
                    .iter()
                    .map(|t| format!("- {}: {}", t.name, t.summary))
                    .collect();
                Ok(Value::String(if lines.is_empty() {
                    format!("No tools are accessible for your agent type ({caller_type:?}).")
                } else {
                    format!("Tools available to you ({caller_type:?}):\n{}", lines.join("\n"))
                }))
            }
            "get_info" => {
                let requested = args.get("tool_name").and_then(Value::as_str).unwrap_or("all");
                if requested.eq_ignore_ascii_case("all") {
                    let sections: Vec<String> = self
                        .authorized_tools(caller_type)
                        .iter()
                        .map(|t| format!("--- Usage for Tool: {} ---\n{}\n--- End Usage ---", t.name, t.detailed_usage()))
                        .collect();
                    let mut output = sections.join("\n\n");
                    if output.len() > MAX_ALL_USAGE_CHARS {
                        output.truncate(MAX_ALL_USAGE_CHARS);
                        output.push_str(TRUNCATION_MARKER);
                    }
                    Ok(Value::String(output))
                } else {
                    match self.tools.get(requested) {
                        Some(def) if def.auth_level.permits(caller_type) => {
                            Ok(Value::String(def.detailed_usage()))
                        }
                        Some(def) => Err(ToolError::new(
                            ToolErrorType::AuthorizationError,
                            requested,
                            format!(
                                "Agent type '{caller_type:?}' is not authorized to access tool '{requested}' (requires level '{}').",
                                def.auth_level.as_str()
                            ),
                        )),
                        None => Err(self.tool_not_found_error(requested)),
                    }
                }
            }
            _ => Err(ToolError::new(
                ToolErrorType::InvalidAction,
                "tool_information",
                "Invalid or missing 'action'. Must be one of ['list_tools', 'get_info'].",
            )),
        }
    }
}
