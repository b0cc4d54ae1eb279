//! Core data model: agents, messages, tool calls/results, and the
//! agent-type/state/status enums that drive the workflow manager and cycle
//! handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants;

/// The three agent archetypes, each with its own state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    Admin,
    Pm,
    Worker,
}

impl AgentType {
    pub fn startup_state(&self) -> &'static str {
        match self {
            AgentType::Admin => constants::ADMIN_STATE_STARTUP,
            AgentType::Pm => constants::PM_STATE_STARTUP,
            AgentType::Worker => constants::WORKER_STATE_STARTUP,
        }
    }
}

/// Operational status — distinct from `state`, which is the workflow
/// graph position. Status tracks what the agent is doing *right now*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Processing,
    Planning,
    AwaitingToolResult,
    ExecutingTool,
    AwaitingCgReview,
    AwaitingUserReviewCg,
    Error,
}

/// Message role. `SystemFrameworkNotification` and `SystemIntervention`
/// are distinct from plain `System` so the next-step scheduler and prompt
/// assembler can recognize framework-injected messages without string
/// sniffing message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
    SystemFrameworkNotification,
    SystemIntervention,
}

/// A single tool invocation parsed out of an assistant response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

/// Outcome status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// The result of executing one [`ToolCall`]. `content` is stored as JSON
/// so both plain-string and structured tool outputs (including the tool
/// executor's structured error object) round-trip uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: Value,
    pub status: ToolResultStatus,
}

/// One entry in an agent's message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: u64,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: now_unix(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            timestamp: now_unix(),
        }
    }

    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: result.content.to_string(),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.call_id.clone()),
            timestamp: now_unix(),
        }
    }

    pub fn framework_notification(content: impl Into<String>) -> Self {
        Self::new(MessageRole::SystemFrameworkNotification, content)
    }

    pub fn intervention(content: impl Into<String>) -> Self {
        Self::new(MessageRole::SystemIntervention, content)
    }
}

/// Per-cycle transient counters, reset or incremented by the next-step
/// scheduler's loop detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleCounters {
    pub consecutive_empty_work_cycles: u32,
    pub work_cycle_count: u32,
    pub failed_models_this_cycle: HashSet<String>,
    pub last_used_api_key: Option<String>,
}

/// A stateful LLM-backed actor. Mutated only by its own cycle execution
/// or by the manager during failover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub agent_type: AgentType,
    pub persona: String,
    pub state: String,
    pub status: AgentStatus,
    pub provider_name: String,
    pub model: String,
    pub temperature: f32,
    pub provider_options: HashMap<String, Value>,
    pub message_history: Vec<Message>,
    pub team_id: Option<String>,
    pub sandbox_path: String,
    pub cycle_counters: CycleCounters,
    /// `true` while the agent is held in Constitutional Guardian review; the
    /// next-step scheduler must not auto-idle out of this hold.
    pub cg_awaiting_user_decision: bool,
    /// Set by the next-step scheduler when a cycle ends in failover; read
    /// and cleared by the prompt assembler on the following cycle so the
    /// Admin framework-status line can summarize what went wrong.
    pub last_cycle_failover: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>, agent_type: AgentType, persona: impl Into<String>) -> Self {
        let id = id.into();
        let sandbox_path = format!("../sandboxes/agent_{id}");
        Self {
            state: agent_type.startup_state().to_string(),
            id,
            agent_type,
            persona: persona.into(),
            status: AgentStatus::Idle,
            provider_name: String::new(),
            model: String::new(),
            temperature: 0.7,
            provider_options: HashMap::new(),
            message_history: Vec::new(),
            team_id: None,
            sandbox_path,
            cycle_counters: CycleCounters::default(),
            cg_awaiting_user_decision: false,
            last_cycle_failover: None,
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        self.id == constants::BOOTSTRAP_AGENT_ID
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
    }

    /// Whether the scheduler may overwrite the current status with `Idle`.
    /// CG review holds are never silently cleared.
    pub fn can_auto_idle(&self) -> bool {
        !(self.status == AgentStatus::AwaitingUserReviewCg && self.cg_awaiting_user_decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_starts_in_its_type_startup_state() {
        let agent = Agent::new("pm_1", AgentType::Pm, "Project Manager");
        assert_eq!(agent.state, constants::PM_STATE_STARTUP);
        assert_eq!(agent.status, AgentStatus::Idle);
    }

    #[test]
    fn bootstrap_agent_id_recognized() {
        let agent = Agent::new(constants::BOOTSTRAP_AGENT_ID, AgentType::Admin, "Admin AI");
        assert!(agent.is_bootstrap());
    }

    #[test]
    fn can_auto_idle_respects_cg_review_hold() {
        let mut agent = Agent::new("w1", AgentType::Worker, "Worker");
        agent.status = AgentStatus::AwaitingUserReviewCg;
        agent.cg_awaiting_user_decision = true;
        assert!(!agent.can_auto_idle());

        agent.cg_awaiting_user_decision = false;
        assert!(agent.can_auto_idle());
    }

    #[test]
    fn tool_result_message_carries_matching_call_id() {
        let result = ToolResult {
            call_id: "call_1".into(),
            name: "tool_one".into(),
            content: serde_json::json!({"ok": true}),
            status: ToolResultStatus::Success,
        };
        let msg = Message::tool_result(&result);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.role, MessageRole::Tool);
    }
}
