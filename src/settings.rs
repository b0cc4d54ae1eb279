//! Explicit configuration/runtime value, replacing a module-level
//! `global_settings` singleton. Constructed once at startup and threaded by
//! reference through every component — no process-wide statics hold
//! request-path state.

use std::collections::HashMap;

use crate::constants::{MAX_RETRIES, RETRY_DELAY_SECONDS};

/// Model selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTier {
    Local,
    Free,
    #[default]
    Any,
}

/// Per-(agent_type,state) max-token budgets.
#[derive(Debug, Clone)]
pub struct TokenBudgets {
    pub pm_startup: u32,
    pub pm_work: u32,
    pub pm_manage: u32,
    pub worker_startup: u32,
    pub worker_work: u32,
    pub worker_wait: u32,
    pub admin_default: u32,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            pm_startup: 2048,
            pm_work: 4096,
            pm_manage: 4096,
            worker_startup: 2048,
            worker_work: 4096,
            worker_wait: 1024,
            admin_default: 4096,
        }
    }
}

/// One bootstrap agent definition, created at startup before any on-demand
/// agent creation.
#[derive(Debug, Clone)]
pub struct BootstrapAgentSpec {
    pub id: String,
    pub persona: String,
    pub requested_provider: Option<String>,
    pub requested_model: Option<String>,
}

/// Provider API key source. Local providers have no keys and are never
/// depleted.
#[derive(Debug, Clone)]
pub struct ProviderKeyConfig {
    pub provider_base: String,
    pub keys: Vec<String>,
}

/// The explicit runtime value: configuration plus the knobs every component
/// needs, built once and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub default_temperature: f32,
    pub max_retries_per_cycle: u32,
    pub retry_delay_seconds: f64,
    pub model_tier: ModelTier,
    pub token_budgets: TokenBudgets,
    pub bootstrap_agents: Vec<BootstrapAgentSpec>,
    pub provider_keys: HashMap<String, ProviderKeyConfig>,
    pub key_quarantine_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_temperature: 0.7,
            max_retries_per_cycle: MAX_RETRIES,
            retry_delay_seconds: RETRY_DELAY_SECONDS,
            model_tier: ModelTier::default(),
            token_budgets: TokenBudgets::default(),
            bootstrap_agents: Vec::new(),
            provider_keys: HashMap::new(),
            key_quarantine_seconds: 300,
        }
    }
}

impl Settings {
    /// Reads overridable fields from the process environment, mirroring the
    /// `Provider::get_base_url`/`get_model` env-lookup convention rather than
    /// requiring a config file.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();

        if let Ok(temp) = std::env::var("AGENT_DEFAULT_TEMPERATURE") {
            if let Ok(parsed) = temp.parse() {
                settings.default_temperature = parsed;
            }
        }
        if let Ok(retries) = std::env::var("AGENT_MAX_RETRIES") {
            if let Ok(parsed) = retries.parse() {
                settings.max_retries_per_cycle = parsed;
            }
        }
        if let Ok(tier) = std::env::var("AGENT_MODEL_TIER") {
            settings.model_tier = match tier.to_lowercase().as_str() {
                "local" => ModelTier::Local,
                "free" => ModelTier::Free,
                _ => ModelTier::Any,
            };
        }

        settings
    }

    pub fn max_tokens_for(&self, agent_type: crate::agent::AgentType, state: &str) -> u32 {
        use crate::agent::AgentType;
        use crate::constants::*;

        match agent_type {
            AgentType::Pm => match state {
                PM_STATE_STARTUP => self.token_budgets.pm_startup,
                PM_STATE_WORK => self.token_budgets.pm_work,
                PM_STATE_MANAGE => self.token_budgets.pm_manage,
                _ => self.token_budgets.pm_work,
            },
            AgentType::Worker => match state {
                WORKER_STATE_STARTUP => self.token_budgets.worker_startup,
                WORKER_STATE_WORK => self.token_budgets.worker_work,
                WORKER_STATE_WAIT => self.token_budgets.worker_wait,
                _ => self.token_budgets.worker_work,
            },
            AgentType::Admin => self.token_budgets.admin_default,
        }
    }
}
