//! Workflow Manager (C6): owns the three agent-type state graphs (state ->
//! prompt/token-budget/legal-transitions) and dispatches the two concrete
//! workflows this crate ships: `plan` (project creation) and `task_list`
//! (PM kickoff).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::agent::{Agent, AgentStatus, AgentType};
use crate::constants::*;
use crate::error::Error;
use crate::xmlish;

/// One node in an agent-type's state graph.
#[derive(Debug, Clone)]
pub struct StateDef {
    pub prompt: String,
    pub max_tokens_override: Option<u32>,
    pub transitions: Vec<String>,
}

impl StateDef {
    fn new(prompt: impl Into<String>, transitions: &[&str]) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens_override: None,
            transitions: transitions.iter().map(|s| s.to_string()).collect(),
        }
    }
}

type Graph = HashMap<&'static str, StateDef>;

fn admin_graph() -> Graph {
    let mut g = Graph::new();
    g.insert(
        ADMIN_STATE_STARTUP,
        StateDef::new(
            "[Admin AI State: startup] Initialize and greet the user, then move to conversation.",
            &[ADMIN_STATE_CONVERSATION],
        ),
    );
    g.insert(
        ADMIN_STATE_CONVERSATION,
        StateDef::new(
            "[Admin AI State: conversation] Talk with the user. When ready to start a project, request the 'planning' state.",
            &[ADMIN_STATE_PLANNING, ADMIN_STATE_STANDBY],
        ),
    );
    g.insert(
        ADMIN_STATE_PLANNING,
        StateDef::new(
            "[Admin AI State: planning] Draft a project plan and submit it with a <plan><title>...</title>...</plan> element.",
            &[ADMIN_STATE_CONVERSATION, ADMIN_STATE_WORK_DELEGATED],
        ),
    );
    g.insert(
        ADMIN_STATE_WORK_DELEGATED,
        StateDef::new(
            "[Admin AI State: work_delegated] The project's PM has been notified; wait or assist as needed.",
            &[ADMIN_STATE_WORK, ADMIN_STATE_CONVERSATION],
        ),
    );
    g.insert(
        ADMIN_STATE_WORK,
        StateDef::new(
            "[Admin AI State: work] Actively assist the project: use tools, review progress, and respond to the team.",
            &[ADMIN_STATE_CONVERSATION, ADMIN_STATE_STANDBY],
        ),
    );
    g.insert(
        ADMIN_STATE_STANDBY,
        StateDef::new(
            "[Admin AI State: admin_standby] Idle; wait for user input or a team event before resuming.",
            &[ADMIN_STATE_CONVERSATION, ADMIN_STATE_WORK],
        ),
    );
    g
}

fn pm_graph() -> Graph {
    let mut g = Graph::new();
    g.insert(
        PM_STATE_STARTUP,
        StateDef::new(
            "[PM State: pm_startup] Decompose the project brief into a <task_list> of concrete tasks.",
            &[PM_STATE_PLAN_DECOMPOSITION],
        ),
    );
    g.insert(
        PM_STATE_PLAN_DECOMPOSITION,
        StateDef::new(
            "[PM State: pm_plan_decomposition] Refine the task breakdown and prepare to assemble the team.",
            &[PM_STATE_BUILD_TEAM_TASKS],
        ),
    );
    g.insert(
        PM_STATE_BUILD_TEAM_TASKS,
        StateDef::new(
            "[PM State: pm_build_team_tasks] Create worker agents for the decomposed tasks.",
            &[PM_STATE_ACTIVATE_WORKERS],
        ),
    );
    g.insert(
        PM_STATE_ACTIVATE_WORKERS,
        StateDef::new(
            "[PM State: pm_activate_workers] Assign tasks to the created workers and activate them.",
            &[PM_STATE_MANAGE],
        ),
    );
    g.insert(
        PM_STATE_MANAGE,
        StateDef::new(
            "[PM State: pm_manage] Monitor worker progress, unblock the team, and report status upward.",
            &[PM_STATE_STANDBY, PM_STATE_WORK],
        ),
    );
    g.insert(
        PM_STATE_STANDBY,
        StateDef::new(
            "[PM State: pm_standby] Idle; resume management on the next team event.",
            &[PM_STATE_MANAGE, PM_STATE_WORK],
        ),
    );
    g.insert(
        PM_STATE_WORK,
        StateDef::new(
            "[PM State: pm_work] Perform hands-on work on the project directly.",
            &[PM_STATE_MANAGE, PM_STATE_STANDBY],
        ),
    );
    g
}

fn worker_graph() -> Graph {
    let mut g = Graph::new();
    g.insert(
        WORKER_STATE_STARTUP,
        StateDef::new(
            "[Worker State: worker_startup] Review your assigned task and begin work.",
            &[WORKER_STATE_WORK],
        ),
    );
    g.insert(
        WORKER_STATE_WORK,
        StateDef::new(
            "[Worker State: worker_work] Work the assigned task using the tools available to you.",
            &[WORKER_STATE_WAIT, WORKER_STATE_WORK],
        ),
    );
    g.insert(
        WORKER_STATE_WAIT,
        StateDef::new(
            "[Worker State: worker_wait] Idle; wait for further instructions from the PM.",
            &[WORKER_STATE_WORK],
        ),
    );
    g
}

/// Input handed to a [`Workflow`] once its trigger tag has been located and
/// its type/state preconditions satisfied.
#[derive(Debug, Clone)]
pub enum WorkflowInput {
    Plan { title: String, raw_plan_body: String },
    TaskList { tasks: Vec<String> },
}

/// Outcome of a workflow execution, applied by the Cycle Handler alongside
/// tool results for the same cycle.
#[derive(Debug, Clone, Default)]
pub struct WorkflowResult {
    pub success: bool,
    pub message: String,
    pub workflow_name: String,
    pub next_state: Option<String>,
    pub next_status: Option<AgentStatus>,
    pub ui_message: Option<String>,
    pub framework_notification: Option<String>,
    pub tasks_to_schedule: Vec<String>,
}

pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;
    fn trigger_tag(&self) -> &str;
    fn allowed_agent_type(&self) -> AgentType;
    fn allowed_agent_state(&self) -> &str;
    fn execute(&self, agent: &Agent, input: &WorkflowInput) -> WorkflowResult;
}

fn sanitize_for_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Project creation workflow (Admin, `planning`), grounded in
/// `project_creation_workflow.py`. Keys created projects by a deterministic
/// id so a spurious re-dispatch of the same `<plan>` does not create a
/// second project.
pub struct ProjectCreationWorkflow {
    created_projects: Mutex<std::collections::HashSet<String>>,
}

impl ProjectCreationWorkflow {
    pub fn new() -> Self {
        Self {
            created_projects: Mutex::new(std::collections::HashSet::new()),
        }
    }

    fn deterministic_project_id(title: &str, triggering_agent_id: &str) -> String {
        format!("project_{}_{}", sanitize_for_id(title), sanitize_for_id(triggering_agent_id))
    }
}

impl Default for ProjectCreationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow for ProjectCreationWorkflow {
    fn name(&self) -> &str {
        "project_creation"
    }

    fn trigger_tag(&self) -> &str {
        "plan"
    }

    fn allowed_agent_type(&self) -> AgentType {
        AgentType::Admin
    }

    fn allowed_agent_state(&self) -> &str {
        ADMIN_STATE_PLANNING
    }

    fn execute(&self, agent: &Agent, input: &WorkflowInput) -> WorkflowResult {
        let WorkflowInput::Plan { title, raw_plan_body } = input else {
            return WorkflowResult {
                success: false,
                message: "project_creation workflow received non-plan input".to_string(),
                workflow_name: self.name().to_string(),
                ..Default::default()
            };
        };

        if title.trim().is_empty() {
            return WorkflowResult {
                success: false,
                message: "Error: project title (<title>) could not be extracted from the plan.".to_string(),
                workflow_name: self.name().to_string(),
                ..Default::default()
            };
        }

        let project_id = Self::deterministic_project_id(title, &agent.id);
        let mut created = self.created_projects.lock().expect("lock poisoned");
        let created_now = created.insert(project_id.clone());

        let message = if created_now {
            format!("Project '{title}' created (id={project_id}), plan body length {}.", raw_plan_body.len())
        } else {
            format!("Project '{title}' (id={project_id}) already exists; plan re-dispatch ignored.")
        };

        WorkflowResult {
            success: true,
            message,
            workflow_name: self.name().to_string(),
            next_state: Some(ADMIN_STATE_CONVERSATION.to_string()),
            next_status: Some(AgentStatus::Idle),
            ui_message: Some(format!("Project '{title}' is being set up.")),
            framework_notification: Some(format!(
                "Project '{title}' has been created and is now awaiting user approval."
            )),
            tasks_to_schedule: Vec::new(),
        }
    }
}

/// PM kickoff workflow (PM, `pm_startup`), grounded in `pm_kickoff_workflow.py`.
pub struct PmKickoffWorkflow;

impl Workflow for PmKickoffWorkflow {
    fn name(&self) -> &str {
        "pm_kickoff"
    }

    fn trigger_tag(&self) -> &str {
        "task_list"
    }

    fn allowed_agent_type(&self) -> AgentType {
        AgentType::Pm
    }

    fn allowed_agent_state(&self) -> &str {
        PM_STATE_STARTUP
    }

    fn execute(&self, _agent: &Agent, input: &WorkflowInput) -> WorkflowResult {
        let WorkflowInput::TaskList { tasks } = input else {
            return WorkflowResult {
                success: false,
                message: "pm_kickoff workflow received non-task_list input".to_string(),
                workflow_name: self.name().to_string(),
                ..Default::default()
            };
        };

        if tasks.is_empty() {
            return WorkflowResult {
                success: false,
                message: "Error: <task_list> contained no <task> entries.".to_string(),
                workflow_name: self.name().to_string(),
                ..Default::default()
            };
        }

        WorkflowResult {
            success: true,
            message: format!("Decomposed project into {} task(s).", tasks.len()),
            workflow_name: self.name().to_string(),
            next_state: Some(PM_STATE_PLAN_DECOMPOSITION.to_string()),
            next_status: Some(AgentStatus::Idle),
            ui_message: Some(format!("PM kicked off with {} task(s).", tasks.len())),
            framework_notification: None,
            tasks_to_schedule: tasks.clone(),
        }
    }
}

/// Owns the three state graphs and the registered workflow set.
pub struct WorkflowManager {
    admin: Graph,
    pm: Graph,
    worker: Graph,
    workflows: Vec<Box<dyn Workflow>>,
}

impl WorkflowManager {
    pub fn new() -> Self {
        Self {
            admin: admin_graph(),
            pm: pm_graph(),
            worker: worker_graph(),
            workflows: vec![Box::new(ProjectCreationWorkflow::new()), Box::new(PmKickoffWorkflow)],
        }
    }

    fn graph_for(&self, agent_type: AgentType) -> &Graph {
        match agent_type {
            AgentType::Admin => &self.admin,
            AgentType::Pm => &self.pm,
            AgentType::Worker => &self.worker,
        }
    }

    /// The system prompt injected as message[0] for this (type, state).
    pub fn prompt_for(&self, agent_type: AgentType, state: &str) -> Option<&str> {
        self.graph_for(agent_type).get(state).map(|d| d.prompt.as_str())
    }

    pub fn max_tokens_override(&self, agent_type: AgentType, state: &str) -> Option<u32> {
        self.graph_for(agent_type).get(state).and_then(|d| d.max_tokens_override)
    }

    pub fn states_for(&self, agent_type: AgentType) -> impl Iterator<Item = &str> {
        self.graph_for(agent_type).keys().copied()
    }

    pub fn is_legal_transition(&self, agent_type: AgentType, from: &str, to: &str) -> bool {
        self.graph_for(agent_type)
            .get(from)
            .map(|d| d.transitions.iter().any(|t| t == to))
            .unwrap_or(false)
    }

    /// Applies `<request_state state='NAME'/>`. Illegal transitions are
    /// rejected (logged, not applied) rather than panicking — the caller
    /// appends a framework message to the agent's history.
    pub fn request_state_change(&self, agent: &mut Agent, target: &str) -> crate::Result<()> {
        if !self.is_legal_transition(agent.agent_type, &agent.state, target) {
            log::warn!(
                "rejected illegal state transition for agent '{}': '{}' -> '{}'",
                agent.id,
                agent.state,
                target
            );
            return Err(Error::StateIllegalTransition {
                agent_id: agent.id.clone(),
                from: agent.state.clone(),
                to: target.to_string(),
            });
        }
        log::info!("agent '{}' transitioned '{}' -> '{}'", agent.id, agent.state, target);
        agent.state = target.to_string();
        Ok(())
    }

    /// Unconditionally moves `agent` to `target`, as long as it is a real
    /// state in its type's graph. Used only by the loop-detection safety net
    /// to force a stuck Admin agent out of a state, bypassing the normal
    /// transition graph.
    pub fn force_state(&self, agent: &mut Agent, target: &str) -> bool {
        if !self.graph_for(agent.agent_type).contains_key(target) {
            return false;
        }
        log::warn!(
            "forcing agent '{}' out of '{}' into '{}' after sustained inactivity",
            agent.id,
            agent.state,
            target
        );
        agent.state = target.to_string();
        true
    }

    /// Scans the raw assistant response for a registered trigger tag. If one
    /// is found its type/state preconditions are checked before execution;
    /// a precondition failure still returns a result (`success: false`) so
    /// the cycle handler can surface it as a framework message rather than
    /// silently dropping the agent's output.
    pub fn dispatch(&self, agent: &Agent, raw_response: &str) -> Option<WorkflowResult> {
        for workflow in &self.workflows {
            let Some(matched) = xmlish::find_first(raw_response, workflow.trigger_tag()) else {
                continue;
            };

            if agent.agent_type != workflow.allowed_agent_type() || agent.state != workflow.allowed_agent_state() {
                return Some(WorkflowResult {
                    success: false,
                    message: format!(
                        "Workflow '{}' triggered by <{}> but agent '{}' is not in an eligible type/state ({:?}/{}).",
                        workflow.name(),
                        workflow.trigger_tag(),
                        agent.id,
                        agent.agent_type,
                        agent.state
                    ),
                    workflow_name: workflow.name().to_string(),
                    ..Default::default()
                });
            }

            let input = match workflow.trigger_tag() {
                "plan" => {
                    let children = xmlish::parse_children_map(&matched.inner);
                    let title = children.get("title").cloned().unwrap_or_default();
                    let raw_plan_body = if let Some(explicit) = children.get("_raw_plan_body_") {
                        explicit.clone()
                    } else {
                        strip_title_tag(&matched.inner)
                    };
                    WorkflowInput::Plan { title, raw_plan_body }
                }
                "task_list" => WorkflowInput::TaskList {
                    tasks: xmlish::parse_repeated_children(&matched.inner, "task"),
                },
                _ => continue,
            };

            return Some(workflow.execute(agent, &input));
        }
        None
    }
}

impl Default for WorkflowManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Part of the `plan` trigger's pre-processing: the Workflow Manager, not
/// the agent, is responsible for turning whatever free-form text follows
/// `<title>` into the raw plan body.
fn strip_title_tag(inner: &str) -> String {
    static TITLE_PATTERN: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"(?s)<title>.*?</title>").expect("valid regex"));
    TITLE_PATTERN.replace(inner, "").trim().to_string()
}
