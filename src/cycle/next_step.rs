//! Sub-step F of the Cycle Handler: the Next-Step Scheduler decision tree,
//! plus the Admin-in-`work` loop-detection safety net. Stuck-agent messaging
//! is a single counter-driven policy rather than several overlapping checks.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agent::{Agent, AgentStatus, AgentType, Message, MessageRole};
use crate::constants::*;
use crate::cycle::outcome_determiner::Outcome;
use crate::failover;
use crate::keys::KeyManager;
use crate::performance::PerformanceTracker;
use crate::registry::ModelRegistry;
use crate::settings::Settings;
use crate::workflow::WorkflowManager;

/// What the caller (the Agent Manager) should do after a cycle finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// Failover succeeded, or the cycle produced reactivation-worthy work:
    /// schedule a new cycle immediately with `retry_count` reset to 0.
    RetryImmediately,
    /// A retryable transport error occurred and the retry budget isn't
    /// exhausted: sleep `delay`, then schedule with `retry_count`.
    RetryAfterDelay { retry_count: u32, delay: Duration },
    /// No candidate model/key could be found; the agent is marked `error`.
    MarkError,
    /// Cycle completed cleanly and nothing calls for reactivation.
    Idle,
    /// Reactivation is deliberately withheld this step (awaiting user
    /// approval, or the work-cycle-count nudge).
    Suppressed,
}

fn last_history_is_awaiting_user_approval(agent: &Agent) -> bool {
    agent
        .message_history
        .last()
        .map(|m| {
            m.role == MessageRole::SystemFrameworkNotification && m.content.contains("awaiting user approval")
        })
        .unwrap_or(false)
}

fn is_persistent_state(agent_type: AgentType, state: &str) -> bool {
    matches!(
        (agent_type, state),
        (AgentType::Admin, ADMIN_STATE_WORK) | (AgentType::Pm, PM_STATE_MANAGE) | (AgentType::Worker, WORKER_STATE_WORK)
    )
}

fn tool_call_signature(call: &crate::agent::ToolCall) -> String {
    let mut args: Vec<(String, String)> = call
        .arguments
        .iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect();
    args.sort();
    format!("{}:{:?}", call.name, args)
}

/// Counts tool-call signatures across the last `window` assistant messages
/// in history (most recent first), returning the max repetition count and
/// whether the `tool_information`/`list_tools` pattern was among the
/// repeats.
fn scan_tool_repetition(agent: &Agent, window: usize) -> (usize, bool) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut list_tools_count = 0usize;

    for message in agent
        .message_history
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::Assistant)
        .take(window)
    {
        for call in &message.tool_calls {
            let sig = tool_call_signature(call);
            if call.name == "tool_information"
                && call.arguments.get("action").and_then(|v| v.as_str()) == Some("list_tools")
            {
                list_tools_count += 1;
            }
            *counts.entry(sig).or_insert(0) += 1;
        }
    }

    let max_repeat = counts.values().copied().max().unwrap_or(0);
    (max_repeat, list_tools_count >= 2)
}

const TOOL_REPETITION_WINDOW: usize = 8;

/// Updates the Admin-in-`work` stuck-agent counters and appends any
/// intervention messages called for. Does not itself decide whether to
/// reactivate — that happens in [`decide`]'s persistent-state branch.
fn apply_admin_work_loop_detection(agent: &mut Agent, workflow_manager: &WorkflowManager, outcome: &Outcome) {
    if agent.agent_type != AgentType::Admin || agent.state != ADMIN_STATE_WORK {
        return;
    }

    agent.cycle_counters.work_cycle_count += 1;

    let empty_cycle = !outcome.action_taken && !outcome.thought_produced;
    if empty_cycle {
        agent.cycle_counters.consecutive_empty_work_cycles += 1;
    } else {
        agent.cycle_counters.consecutive_empty_work_cycles = 0;
    }

    let n = agent.cycle_counters.consecutive_empty_work_cycles;
    if n >= LOOP_FORCED_TRANSITION_AT {
        agent.message_history.push(Message::intervention(
            "You have produced no tool calls or thoughts for five consecutive cycles. \
             Forcing a transition back to 'admin_conversation' so you can re-engage with the user.",
        ));
        workflow_manager.force_state(agent, ADMIN_STATE_CONVERSATION);
        agent.cycle_counters.consecutive_empty_work_cycles = 0;
    } else if n >= LOOP_SECOND_INTERVENTION_AT {
        agent.message_history.push(Message::intervention(format!(
            "[Second intervention] This is your {n} consecutive cycle with no tool call, thought, or action. \
             Use a tool now, e.g. <tool_information><action>list_tools</action></tool_information>, \
             or request a state change if you are actually done with this work."
        )));
    } else if n == LOOP_FIRST_INTERVENTION_AT {
        agent.message_history.push(Message::intervention(
            "[First intervention] Two consecutive cycles produced no tool call or thought. \
             Take a concrete action or explain your plan in a <think> block.",
        ));
    }

    if agent.cycle_counters.work_cycle_count == WORK_CYCLE_LIMIT {
        agent.message_history.push(Message::framework_notification(
            "You have been in 'work' for 12 cycles. Please summarize progress so far and, \
             if the work is complete, request a state change.",
        ));
    }

    let (max_repeat, list_tools_pattern) = scan_tool_repetition(agent, TOOL_REPETITION_WINDOW);
    let prior_intervention_exists = agent
        .message_history
        .iter()
        .any(|m| m.role == MessageRole::SystemIntervention);

    if list_tools_pattern && prior_intervention_exists {
        agent.message_history.push(Message::intervention(
            "[Emergency override] You have repeatedly listed available tools without acting on them. \
             Forcing a transition back to 'admin_conversation'.",
        ));
        workflow_manager.force_state(agent, ADMIN_STATE_CONVERSATION);
        agent.cycle_counters.consecutive_empty_work_cycles = 0;
    } else if max_repeat >= TOOL_REPETITION_THRESHOLD {
        agent.message_history.push(Message::intervention(format!(
            "[Repetition detected] The same tool call has been made {max_repeat} times in the last \
             {TOOL_REPETITION_WINDOW} assistant messages. Try a different approach."
        )));
    }
}

/// Runs the Next-Step Scheduler decision tree for one finished cycle.
/// Invokes the Failover Handler (C8) inline when `outcome.trigger_failover`.
#[allow(clippy::too_many_arguments)]
pub async fn decide(
    agent: &mut Agent,
    workflow_manager: &WorkflowManager,
    registry: &ModelRegistry,
    key_manager: &Mutex<KeyManager>,
    performance: &Mutex<PerformanceTracker>,
    settings: &Settings,
    outcome: &Outcome,
    retry_count: u32,
) -> NextStep {
    if outcome.trigger_failover {
        let kind = outcome.error_kind.unwrap_or(crate::error::ExceptionKind::Unknown);
        agent.last_cycle_failover = Some(format!("{kind:?}"));
        let result = failover::attempt(agent, kind, registry, key_manager, performance, settings).await;
        return if result.success {
            agent.set_status(AgentStatus::Processing);
            NextStep::RetryImmediately
        } else {
            agent.set_status(AgentStatus::Error);
            NextStep::MarkError
        };
    }

    if outcome.needs_reactivation {
        if agent.agent_type == AgentType::Admin && last_history_is_awaiting_user_approval(agent) {
            return NextStep::Suppressed;
        }
        return NextStep::RetryImmediately;
    }

    if outcome.retryable {
        if retry_count < settings.max_retries_per_cycle {
            return NextStep::RetryAfterDelay {
                retry_count: retry_count + 1,
                delay: Duration::from_secs_f64(settings.retry_delay_seconds),
            };
        }
        let kind = outcome.error_kind.unwrap_or(crate::error::ExceptionKind::Unknown);
        agent.last_cycle_failover = Some(format!("{kind:?}"));
        let result = failover::attempt(agent, kind, registry, key_manager, performance, settings).await;
        return if result.success {
            agent.set_status(AgentStatus::Processing);
            NextStep::RetryImmediately
        } else {
            agent.set_status(AgentStatus::Error);
            NextStep::MarkError
        };
    }

    if outcome.cycle_completed_successfully {
        if is_persistent_state(agent.agent_type, &agent.state) {
            apply_admin_work_loop_detection(agent, workflow_manager, outcome);
            if agent.cycle_counters.work_cycle_count == WORK_CYCLE_LIMIT && agent.agent_type == AgentType::Admin {
                return NextStep::Suppressed;
            }
            return NextStep::RetryImmediately;
        }

        let no_action_no_tool = !outcome.action_taken && !outcome.executed_tool_successfully;
        let pm_startup_stall = agent.agent_type == AgentType::Pm
            && agent.state == PM_STATE_STARTUP
            && no_action_no_tool
            && !outcome.thought_produced;
        let pm_decomposition_stall = agent.agent_type == AgentType::Pm
            && matches!(agent.state.as_str(), PM_STATE_PLAN_DECOMPOSITION | PM_STATE_BUILD_TEAM_TASKS | PM_STATE_ACTIVATE_WORKERS)
            && no_action_no_tool;

        if pm_startup_stall || pm_decomposition_stall {
            agent.message_history.push(Message::framework_notification(format!(
                "No action was taken in state '{}'. This state requires a concrete output before proceeding — \
                 review the state's instructions and respond accordingly.",
                agent.state
            )));
            return NextStep::RetryImmediately;
        }

        if agent.can_auto_idle() {
            agent.set_status(AgentStatus::Idle);
        }
        return NextStep::Idle;
    }

    // Cycle neither completed, nor needs reactivation, nor was retryable:
    // nothing more to do this step.
    NextStep::Idle
}
