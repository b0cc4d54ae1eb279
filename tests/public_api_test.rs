//! Integration tests exercising the crate's public surface end to end,
//! without a live provider: key rotation, tool authorization boundaries,
//! workflow state legality, and context-window bookkeeping.

use std::time::Duration;

use agent_orchestrator_core::cycle::next_step::{self, NextStep};
use agent_orchestrator_core::cycle::outcome_determiner::Outcome;
use agent_orchestrator_core::{
    tool, Agent, AgentType, AuthLevel, Error, ExceptionKind, KeyManager, ModelInfo, ModelRegistry,
    PerformanceTracker, ProviderInstance, Settings, ToolExecutor, WorkflowManager,
};
use tokio::sync::Mutex;

fn registry_with_remote_two_keys() -> (ModelRegistry, Mutex<KeyManager>) {
    let mut registry = ModelRegistry::new();
    let mut openrouter = ProviderInstance::new("openrouter", Some("https://openrouter.ai/api/v1".into()), false);
    openrouter.models.push(ModelInfo::new("mistral-7b-instruct"));
    registry.register_provider(openrouter);

    let mut keys = KeyManager::new(Duration::from_secs(60));
    keys.register_provider_keys("openrouter", vec!["key-a".to_string(), "key-b".to_string()]);
    (registry, Mutex::new(keys))
}

// Scenario: key rotation. First key is bad; Key Manager has a second key;
// failover rotates the key without switching model or provider.
#[tokio::test]
async fn key_rotation_quarantines_failed_key_and_keeps_same_model() {
    let (registry, keys) = registry_with_remote_two_keys();
    let performance = Mutex::new(PerformanceTracker::new());
    let settings = Settings::default();

    let mut agent = Agent::new("w1", AgentType::Worker, "Worker");
    agent.provider_name = "openrouter".to_string();
    agent.model = "mistral-7b-instruct".to_string();
    agent.cycle_counters.last_used_api_key = Some("key-a".to_string());

    let result = agent_orchestrator_core::failover::attempt(
        &mut agent,
        ExceptionKind::AuthInvalid,
        &registry,
        &keys,
        &performance,
        &settings,
    )
    .await;

    assert!(result.success);
    assert_eq!(agent.provider_name, "openrouter");
    assert_eq!(agent.model, "mistral-7b-instruct");
    assert_eq!(agent.cycle_counters.last_used_api_key.as_deref(), Some("key-b"));

    let mut guard = keys.lock().await;
    assert!(
        !guard.is_provider_depleted("openrouter"),
        "key-b remains usable even though key-a is now quarantined"
    );
    let _ = guard.get_active_key_config("openrouter");
}

// Scenario: retryable then success. A transport-level retryable outcome
// under budget schedules a delayed retry with an incremented counter; once
// the budget is exhausted the scheduler escalates to failover instead.
#[tokio::test]
async fn retryable_outcome_retries_then_escalates_at_budget() {
    let registry = ModelRegistry::new();
    let keys = Mutex::new(KeyManager::new(Duration::from_secs(60)));
    let performance = Mutex::new(PerformanceTracker::new());
    let settings = Settings::default();
    let manager = WorkflowManager::new();

    let mut agent = Agent::new("w1", AgentType::Worker, "Worker");
    let outcome = Outcome {
        retryable: true,
        error_kind: Some(ExceptionKind::Timeout),
        ..Default::default()
    };

    let step = next_step::decide(&mut agent, &manager, &registry, &keys, &performance, &settings, &outcome, 0).await;
    assert_eq!(
        step,
        NextStep::RetryAfterDelay {
            retry_count: 1,
            delay: Duration::from_secs_f64(settings.retry_delay_seconds)
        }
    );

    let step = next_step::decide(
        &mut agent,
        &manager,
        &registry,
        &keys,
        &performance,
        &settings,
        &outcome,
        settings.max_retries_per_cycle,
    )
    .await;
    assert_eq!(step, NextStep::MarkError, "no registry candidates means failover fails closed");
}

#[tokio::test]
async fn tool_executor_rejects_worker_calling_admin_only_tool() {
    let mut executor = ToolExecutor::new();
    executor.register(
        tool("delete_agent", "remove an agent from the team")
            .auth_level(AuthLevel::Admin)
            .build(|args| async move { Ok(args) }),
    );

    let err = executor
        .execute_tool(AgentType::Worker, "delete_agent", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.error_type, agent_orchestrator_core::ToolErrorType::AuthorizationError);
}

#[tokio::test]
async fn tool_executor_permits_admin_calling_worker_tool() {
    let mut executor = ToolExecutor::new();
    executor.register(
        tool("write_file", "write a file")
            .auth_level(AuthLevel::Worker)
            .build(|args| async move { Ok(args) }),
    );

    let result = executor
        .execute_tool(AgentType::Admin, "write_file", serde_json::json!({"path": "a.txt"}))
        .await;
    assert!(result.is_ok());
}

#[test]
fn workflow_manager_rejects_illegal_state_transition() {
    let manager = WorkflowManager::new();
    let mut agent = Agent::new("admin", AgentType::Admin, "Admin");
    let illegal_target = "not_a_real_state";
    assert!(!manager.is_legal_transition(AgentType::Admin, &agent.state, illegal_target));
    assert!(manager.request_state_change(&mut agent, illegal_target).is_err());
}

#[test]
fn context_truncation_preserves_system_prompt_and_keeps_recent_turns() {
    use agent_orchestrator_core::{truncate_messages, Message};

    let history = vec![
        Message::system("persona"),
        Message::user("turn 1"),
        Message::assistant("ack 1"),
        Message::user("turn 2"),
        Message::assistant("ack 2"),
    ];

    let truncated = truncate_messages(&history, 2, true);
    assert_eq!(truncated.first().unwrap().content, "persona");
    assert_eq!(truncated.len(), 3);
}

#[test]
fn key_manager_reports_depleted_when_all_keys_quarantined() {
    let mut keys = KeyManager::new(Duration::from_secs(60));
    keys.register_provider_keys("openrouter", vec!["only-key".to_string()]);
    assert!(!keys.is_provider_depleted("openrouter"));

    keys.quarantine_key("openrouter", "only-key", None);
    assert!(keys.is_provider_depleted("openrouter"));
    assert!(matches!(Error::NoModelAvailable("x".into()), Error::NoModelAvailable(_)));
}
