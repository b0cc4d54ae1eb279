//! Persisted-interaction interface. The core never
//! owns storage; an embedder wires in whatever log/query backend it has
//! (a database, a file, nothing at all) by implementing [`InteractionSink`].
//! `InMemorySink` is provided for tests and examples, not production use.

use std::sync::Mutex;

use crate::agent::{MessageRole, ToolCall, ToolResult};

/// Called once per message an agent's history gains, after the Cycle
/// Handler or [`crate::manager::AgentManager::send_message`] appends it.
/// `session_id` groups turns belonging to one team/project run.
pub trait InteractionSink: Send + Sync {
    fn log_interaction(
        &self,
        session_id: &str,
        agent_id: &str,
        role: MessageRole,
        content: &str,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    );
}

/// One recorded call to [`InteractionSink::log_interaction`].
#[derive(Debug, Clone)]
pub struct LoggedInteraction {
    pub session_id: String,
    pub agent_id: String,
    pub role: MessageRole,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
}

/// In-memory sink that records every interaction in call order. Used by
/// this crate's own tests in place of a real SQL-backed sink.
#[derive(Default)]
pub struct InMemorySink {
    records: Mutex<Vec<LoggedInteraction>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LoggedInteraction> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl InteractionSink for InMemorySink {
    fn log_interaction(
        &self,
        session_id: &str,
        agent_id: &str,
        role: MessageRole,
        content: &str,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(LoggedInteraction {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            role,
            content: content.to_string(),
            tool_calls: tool_calls.to_vec(),
            tool_results: tool_results.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_records_in_call_order() {
        let sink = InMemorySink::new();
        sink.log_interaction("session_1", "admin_ai", MessageRole::User, "hi", &[], &[]);
        sink.log_interaction("session_1", "admin_ai", MessageRole::Assistant, "hello", &[], &[]);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, MessageRole::User);
        assert_eq!(records[1].content, "hello");
    }

    #[test]
    fn records_carry_tool_calls_and_results() {
        let sink = InMemorySink::new();
        let call = ToolCall {
            call_id: "call_1".to_string(),
            name: "write_file".to_string(),
            arguments: std::collections::HashMap::new(),
        };
        let result = ToolResult {
            call_id: "call_1".to_string(),
            name: "write_file".to_string(),
            content: serde_json::Value::Null,
            status: crate::agent::ToolResultStatus::Success,
        };
        sink.log_interaction(
            "session_1",
            "worker_1",
            MessageRole::Assistant,
            "<write_file/>",
            std::slice::from_ref(&call),
            std::slice::from_ref(&result),
        );

        let records = sink.records();
        assert_eq!(records[0].tool_calls.len(), 1);
        assert_eq!(records[0].tool_results.len(), 1);
    }
}
