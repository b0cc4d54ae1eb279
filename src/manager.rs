//! Agent Manager (C10): owns the agent set, enforces at most one in-flight
//! cycle per agent, routes inter-agent messages, and broadcasts observable
//! events to a UI sink.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::agent::{Agent, AgentStatus, Message};
use crate::cycle;
use crate::cycle::next_step::{self, NextStep};
use crate::error::{Error, Result};
use crate::keys::KeyManager;
use crate::lifecycle::{self, AgentConfig, CreateAgentResult};
use crate::performance::PerformanceTracker;
use crate::provider::ProviderAdapter;
use crate::registry::ModelRegistry;
use crate::settings::Settings;
use crate::sink::InteractionSink;
use crate::tools::ToolExecutor;
use crate::workflow::WorkflowManager;

/// One observable event, broadcast to every subscriber of the UI sink.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    StatusChanged { agent_id: String, status: AgentStatus },
    CycleFinished { agent_id: String, cycle_completed_successfully: bool },
    ToolExecuted { agent_id: String, tool_name: String, success: bool },
    Intervention { agent_id: String, message: String },
    Failover { agent_id: String, kind: String, success: bool },
    TasksScheduled { agent_id: String, tasks: Vec<String> },
    Error { agent_id: String, message: String },
}

/// The shared, mostly-read-only subsystems every cycle needs. Built once at
/// process start and handed around by `Arc` rather than living as module-level
/// singletons.
pub struct Runtime {
    pub settings: Settings,
    pub registry: ModelRegistry,
    pub workflow_manager: WorkflowManager,
    pub tool_executor: ToolExecutor,
    pub key_manager: Mutex<KeyManager>,
    pub performance: Mutex<PerformanceTracker>,
    /// Opaque log/query collaborator for persisted interaction state. `None` when
    /// the embedder doesn't care to persist interactions.
    pub sink: Option<Arc<dyn InteractionSink>>,
}

struct Inner {
    runtime: Arc<Runtime>,
    agents: RwLock<HashMap<String, Arc<Mutex<Agent>>>>,
    providers: RwLock<HashMap<String, Arc<ProviderAdapter>>>,
    events: broadcast::Sender<ManagerEvent>,
}

/// Extracts the fired workflow's `tasks_to_schedule` from a finished cycle's
/// report, if any non-empty list was produced.
fn scheduled_tasks(report: &cycle::CycleReport) -> Option<Vec<String>> {
    report
        .workflow_result
        .as_ref()
        .map(|r| r.tasks_to_schedule.clone())
        .filter(|tasks| !tasks.is_empty())
}

/// Cheaply cloneable handle to the agent set and its subsystems. Each clone
/// shares the same underlying state.
#[derive(Clone)]
pub struct AgentManager(Arc<Inner>);

impl AgentManager {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self(Arc::new(Inner {
            runtime,
            agents: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
            events,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.0.events.subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        // No subscribers is a normal, not-worth-logging state.
        let _ = self.0.events.send(event);
    }

    /// Forwards one interaction to the configured sink, if any. `session_id`
    /// is the agent's team when it has one, else its own id.
    fn log_to_sink(
        &self,
        agent: &Agent,
        role: crate::agent::MessageRole,
        content: &str,
        tool_calls: &[crate::agent::ToolCall],
        tool_results: &[crate::agent::ToolResult],
    ) {
        if let Some(sink) = &self.0.runtime.sink {
            let session_id = agent.team_id.as_deref().unwrap_or(&agent.id);
            sink.log_interaction(session_id, &agent.id, role, content, tool_calls, tool_results);
        }
    }

    /// Registers (or replaces) the adapter used for calls against
    /// `provider_base`. Creating an agent on a provider with no registered
    /// adapter is an error at cycle time, not at creation time, since an
    /// agent's provider can change underneath it via failover.
    pub async fn register_provider_adapter(&self, provider_base: impl Into<String>, adapter: ProviderAdapter) {
        self.0.providers.write().await.insert(provider_base.into(), Arc::new(adapter));
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<Arc<Mutex<Agent>>> {
        self.0.agents.read().await.get(agent_id).cloned()
    }

    /// Creates a new agent via the Lifecycle Manager (C9) and registers it.
    pub async fn create_agent(
        &self,
        requested_id: Option<String>,
        agent_type: crate::agent::AgentType,
        config: AgentConfig,
        team_id: Option<String>,
    ) -> Result<CreateAgentResult> {
        let (agent, result) = {
            let performance = self.0.runtime.performance.lock().await;
            lifecycle::create_agent(
                requested_id,
                agent_type,
                config,
                team_id,
                &self.0.runtime.registry,
                &performance,
                &self.0.runtime.settings,
            )?
        };

        let agent_id = agent.id.clone();
        self.0.agents.write().await.insert(agent_id, Arc::new(Mutex::new(agent)));
        Ok(result)
    }

    /// Deletes `agent_id` via the Lifecycle Manager, removing it and its
    /// provider adapter entry from the map. Fails for bootstrap agents.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let mut agents = self.0.agents.write().await;
        let Some(handle) = agents.get(agent_id) else {
            return Err(Error::UnknownAgent(agent_id.to_string()));
        };
        {
            let agent = handle.lock().await;
            lifecycle::delete_agent(&agent)?;
        }
        agents.remove(agent_id);
        Ok(())
    }

    /// Appends a `user`-role message to `recipient`'s history and schedules
    /// it if idle, per the inter-agent messaging contract.
    pub async fn send_message(&self, recipient: &str, content: impl Into<String>) -> Result<()> {
        let Some(handle) = self.get_agent(recipient).await else {
            return Err(Error::UnknownAgent(recipient.to_string()));
        };

        let content = content.into();
        let should_schedule = {
            let mut agent = handle.lock().await;
            agent.message_history.push(Message::user(content.clone()));
            self.log_to_sink(&agent, crate::agent::MessageRole::User, &content, &[], &[]);
            if agent.status == AgentStatus::Idle {
                agent.set_status(AgentStatus::Processing);
                true
            } else {
                false
            }
        };

        if should_schedule {
            self.schedule_cycle(recipient.to_string(), 0);
        }
        Ok(())
    }

    /// Schedules one cycle for `agent_id` as a concurrent task. Enforces at
    /// most one in-flight cycle per agent via a per-agent `try_lock`:
    /// attempts to schedule while a cycle is already running are dropped
    /// with a warning rather than queued.
    pub fn schedule_cycle(&self, agent_id: String, retry_count: u32) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_one_cycle(agent_id, retry_count).await;
        });
    }

    async fn run_one_cycle(&self, agent_id: String, retry_count: u32) {
        let Some(handle) = self.get_agent(&agent_id).await else {
            log::warn!("schedule_cycle called for unknown agent '{agent_id}'");
            return;
        };

        let Ok(mut agent) = handle.clone().try_lock_owned() else {
            log::warn!("agent '{agent_id}' is already mid-cycle; dropping this schedule request");
            return;
        };

        let Some(adapter) = self.0.providers.read().await.get(&agent.provider_name).cloned() else {
            log::error!(
                "no provider adapter registered for '{}' (agent '{agent_id}')",
                agent.provider_name
            );
            agent.set_status(AgentStatus::Error);
            self.emit(ManagerEvent::Error {
                agent_id: agent_id.clone(),
                message: format!("no provider adapter for '{}'", agent.provider_name),
            });
            return;
        };

        let history_len_before = agent.message_history.len();

        let report = cycle::run(
            &mut agent,
            &adapter,
            &self.0.runtime.workflow_manager,
            &self.0.runtime.tool_executor,
            &self.0.runtime.settings,
            retry_count,
        )
        .await;

        for result in &report.tool_results {
            self.emit(ManagerEvent::ToolExecuted {
                agent_id: agent_id.clone(),
                tool_name: result.name.clone(),
                success: result.status == crate::agent::ToolResultStatus::Success,
            });
        }
        self.emit(ManagerEvent::CycleFinished {
            agent_id: agent_id.clone(),
            cycle_completed_successfully: report.outcome.cycle_completed_successfully,
        });

        // A fired workflow's `tasks_to_schedule` (e.g. the PM kickoff task
        // list) has no in-crate task queue to land in — sandbox/task
        // persistence is an external collaborator — so it's surfaced as an
        // event for the embedder to act on (create workers, enqueue tasks)
        // rather than silently dropped.
        if let Some(tasks) = scheduled_tasks(&report) {
            self.emit(ManagerEvent::TasksScheduled {
                agent_id: agent_id.clone(),
                tasks,
            });
        }

        let next = next_step::decide(
            &mut agent,
            &self.0.runtime.workflow_manager,
            &self.0.runtime.registry,
            &self.0.runtime.key_manager,
            &self.0.runtime.performance,
            &self.0.runtime.settings,
            &report.outcome,
            retry_count,
        )
        .await;

        // `decide` appends loop-detection interventions and framework nudges
        // directly to `agent.message_history` after `cycle::run` already
        // returned, so the persisted-interaction range has to be read once
        // more here rather than before `decide` runs — otherwise everything
        // it appended is never logged to the sink.
        if self.0.runtime.sink.is_some() {
            for message in &agent.message_history[history_len_before..] {
                let call = message.tool_calls.clone();
                let results: Vec<_> = report
                    .tool_results
                    .iter()
                    .filter(|r| message.tool_call_id.as_deref() == Some(r.call_id.as_str()))
                    .cloned()
                    .collect();
                self.log_to_sink(&agent, message.role, &message.content, &call, &results);
            }
        }

        for message in &agent.message_history[history_len_before..] {
            if message.role == crate::agent::MessageRole::SystemIntervention {
                self.emit(ManagerEvent::Intervention {
                    agent_id: agent_id.clone(),
                    message: message.content.clone(),
                });
            }
        }

        if let Some(kind) = agent.last_cycle_failover.clone() {
            self.emit(ManagerEvent::Failover {
                agent_id: agent_id.clone(),
                kind,
                success: matches!(next, NextStep::RetryImmediately),
            });
        }

        self.emit(ManagerEvent::StatusChanged {
            agent_id: agent_id.clone(),
            status: agent.status,
        });

        drop(agent);

        match next {
            NextStep::RetryImmediately => self.schedule_cycle(agent_id, 0),
            NextStep::RetryAfterDelay { retry_count, delay } => {
                let manager = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.schedule_cycle(agent_id, retry_count);
                });
            }
            NextStep::MarkError | NextStep::Idle | NextStep::Suppressed => {}
        }
    }
}
