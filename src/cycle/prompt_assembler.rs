//! Sub-step A of the Cycle Handler: assembles the message list sent to the
//! provider for one cycle. Never mutates the agent's own history — the
//! state prompt and Admin framework-status line are local-copy-only, added
//! in front of a clone of `agent.message_history`.

use crate::agent::{Agent, AgentType, Message};
use crate::settings::Settings;
use crate::workflow::WorkflowManager;

fn admin_framework_status(agent: &Agent) -> String {
    let turn_summary = match &agent.last_cycle_failover {
        None => "last turn OK".to_string(),
        Some(error_class) => format!("last turn failed over ({error_class})"),
    };
    format!(
        "[Framework Status] {turn_summary}; state={} status={:?} work_cycle_count={} consecutive_empty_work_cycles={}",
        agent.state, agent.status, agent.cycle_counters.work_cycle_count, agent.cycle_counters.consecutive_empty_work_cycles
    )
}

/// Builds the prepared history: `message[0]` is the state's system prompt;
/// for Admin agents `message[1]` is a framework-status line the other agent
/// types don't receive, since only the Admin AI reasons about the overall
/// team's progress. Consumes (and the caller should clear) `last_cycle_failover`
/// once it has been surfaced in this line.
pub fn assemble(agent: &Agent, workflow_manager: &WorkflowManager, _settings: &Settings) -> Vec<Message> {
    let mut prepared = Vec::with_capacity(agent.message_history.len() + 2);

    let prompt = workflow_manager
        .prompt_for(agent.agent_type, &agent.state)
        .unwrap_or("You have no further instructions for this state.");
    prepared.push(Message::system(prompt));

    if agent.agent_type == AgentType::Admin {
        prepared.push(Message::system(admin_framework_status(agent)));
    }

    prepared.extend(agent.message_history.iter().cloned());
    prepared
}

/// The max-token budget for this cycle: a per-state override from the
/// workflow graph takes precedence over the blanket `Settings` default.
pub fn max_tokens(agent: &Agent, workflow_manager: &WorkflowManager, settings: &Settings) -> Option<u32> {
    workflow_manager
        .max_tokens_override(agent.agent_type, &agent.state)
        .or_else(|| Some(settings.max_tokens_for(agent.agent_type, &agent.state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentType;

    #[test]
    fn state_prompt_is_always_message_zero() {
        let manager = WorkflowManager::new();
        let settings = Settings::default();
        let agent = Agent::new("w1", AgentType::Worker, "Worker");

        let prepared = assemble(&agent, &manager, &settings);
        assert_eq!(prepared[0].role, crate::agent::MessageRole::System);
        assert!(prepared[0].content.contains("worker_startup") || prepared[0].content.contains("Worker"));
    }

    #[test]
    fn only_admin_gets_framework_status_at_index_one() {
        let manager = WorkflowManager::new();
        let settings = Settings::default();

        let admin = Agent::new(crate::constants::BOOTSTRAP_AGENT_ID, AgentType::Admin, "Admin");
        let prepared = assemble(&admin, &manager, &settings);
        assert!(prepared[1].content.contains("Framework Status"));

        let worker = Agent::new("w1", AgentType::Worker, "Worker");
        let prepared = assemble(&worker, &manager, &settings);
        assert!(!prepared.get(1).map(|m| m.content.contains("Framework Status")).unwrap_or(false));
    }

    #[test]
    fn assembling_does_not_mutate_agent_history() {
        let manager = WorkflowManager::new();
        let settings = Settings::default();
        let mut agent = Agent::new("w1", AgentType::Worker, "Worker");
        agent.message_history.push(Message::user("hello"));

        let _ = assemble(&agent, &manager, &settings);
        assert_eq!(agent.message_history.len(), 1);
    }
}
