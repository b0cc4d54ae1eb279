//! # Agent Orchestrator Core
//!
//! A multi-agent orchestration core for LLM-backed agents running against
//! local or remote OpenAI-compatible providers: LM Studio, Ollama,
//! llama.cpp, vLLM, or a remote host.
//!
//! ## What this crate owns
//!
//! Three agent archetypes — Admin, PM, Worker — each driven by its own state
//! graph. Every agent runs a cycle loop: assemble a prompt from its current
//! state and history, stream a completion, parse the response for a
//! `<think>` aside, a state-change request, and zero or more XML-tagged tool
//! calls, execute whatever tools and workflow triggers fired, classify the
//! outcome, and decide whether/when the agent runs again.
//!
//! ## Module map
//!
//! - [`agent`] — Agent/Message/ToolCall data model
//! - [`provider`] — Provider Adapter: streaming completion + error classification (C1)
//! - [`registry`] — Model Registry: provider/model discovery (C2)
//! - [`keys`] — Key Manager: rotation and quarantine (C3)
//! - [`performance`] — Performance Tracker: ranked failover candidates (C4)
//! - [`tools`] — Tool Executor: authorization, structured errors, suggestions (C5)
//! - [`workflow`] — Workflow Manager: state graphs and multi-step triggers (C6)
//! - [`cycle`] — Cycle Handler: the per-agent A-F sub-step pipeline (C7)
//! - [`failover`] — Failover Handler: key-rotate/model-switch recovery (C8)
//! - [`lifecycle`] — Lifecycle Manager: agent creation/destruction (C9)
//! - [`manager`] — Agent Manager: the agent set, scheduling, message routing (C10)
//!
//! Ambient stack: [`error`] for the error taxonomy, [`settings`] for the
//! explicit runtime value, [`retry`] for transport-level backoff, [`context`]
//! for token estimation, [`hooks`] for PreToolUse/PostToolUse interception,
//! and [`sink`] for the optional persisted-interaction log.

pub mod agent;
pub mod constants;
pub mod context;
pub mod cycle;
pub mod error;
pub mod failover;
pub mod hooks;
pub mod keys;
pub mod lifecycle;
pub mod manager;
pub mod model_key;
pub mod performance;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod sink;
pub mod tools;
pub mod workflow;
mod xmlish;

// --- Core data model ---

pub use agent::{
    Agent, AgentStatus, AgentType, CycleCounters, Message, MessageRole, ToolCall, ToolResult,
    ToolResultStatus,
};

// --- Error handling ---

pub use error::{Error, ExceptionKind, Result};

// --- Runtime configuration ---

pub use settings::{BootstrapAgentSpec, ModelTier, ProviderKeyConfig, Settings, TokenBudgets};

// --- Provider Adapter (C1) ---

pub use provider::{EventStream, ProviderAdapter, StreamEvent};

// --- Model Registry (C2) ---

pub use registry::{ModelInfo, ModelRegistry, ProviderInstance};

// --- Key Manager (C3) ---

pub use keys::{KeyConfig, KeyManager};

// --- Performance Tracker (C4) ---

pub use performance::{PerformanceTracker, RankedModel};

// --- Tool Executor (C5) ---

pub use tools::{tool, AuthLevel, ToolBuilder, ToolDef, ToolError, ToolErrorType, ToolExecutor};

// --- Workflow Manager (C6) ---

pub use workflow::{Workflow, WorkflowManager, WorkflowResult};

// --- Cycle Handler (C7) ---

pub use cycle::{CycleContext, CycleReport};

// --- Failover Handler (C8) ---

pub use failover::FailoverOutcome;

// --- Lifecycle Manager (C9) ---

pub use lifecycle::{AgentConfig, CreateAgentResult};

// --- Agent Manager (C10) ---

pub use manager::{AgentManager, ManagerEvent, Runtime};

// --- Persisted-interaction sink ---

pub use sink::{InMemorySink, InteractionSink, LoggedInteraction};

// --- Hooks ---

pub use hooks::{
    HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT,
};

// --- Context management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

/// Commonly used types and functions, re-exported for `use
/// agent_orchestrator_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Agent, AgentManager, AgentStatus, AgentType, Error, Message, MessageRole, ModelRegistry,
        Result, Runtime, Settings, ToolCall, ToolExecutor, ToolResult, WorkflowManager,
    };
}
