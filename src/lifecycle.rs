//! Lifecycle Manager (C9): creates and destroys agents, selects an initial
//! model when the caller doesn't pin one, validates provider/model config,
//! and attaches a Provider Adapter.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::agent::{Agent, AgentType};
use crate::error::{Error, Result};
use crate::model_key::ModelKey;
use crate::performance::PerformanceTracker;
use crate::registry::ModelRegistry;
use crate::settings::{ModelTier, Settings};

/// What the caller asked for when creating an agent; any field left unset is
/// auto-selected.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub requested_provider: Option<String>,
    pub requested_model: Option<String>,
    pub persona: String,
    pub temperature: Option<f32>,
    pub provider_options: HashMap<String, serde_json::Value>,
}

/// Outcome of [`create_agent`].
#[derive(Debug, Clone)]
pub struct CreateAgentResult {
    pub success: bool,
    pub message: String,
    pub agent_id: Option<String>,
}

fn generate_agent_id(agent_type: AgentType) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    let prefix = match agent_type {
        AgentType::Admin => "admin",
        AgentType::Pm => "pm",
        AgentType::Worker => "worker",
    };
    format!("{prefix}_{millis}_{suffix}")
}

fn is_free_suffix(model_suffix: &str) -> bool {
    model_suffix.ends_with(":free")
}

/// Picks a `(provider, model, is_local)` candidate when the caller didn't
/// request one, honoring `settings.model_tier` and falling back to the
/// Performance Tracker's ranking (C4) with its built-in size tie-break.
fn auto_select_model(
    registry: &ModelRegistry,
    performance: &PerformanceTracker,
    tier: ModelTier,
) -> Option<(String, String, bool)> {
    match tier {
        ModelTier::Local => registry.local_providers().find_map(|provider| {
            provider
                .models
                .first()
                .map(|model| (provider.name.clone(), model.model_suffix.clone(), true))
        }),
        ModelTier::Free => {
            for provider in registry.local_providers() {
                if let Some(model) = provider.models.first() {
                    return Some((provider.name.clone(), model.model_suffix.clone(), true));
                }
            }
            performance
                .get_ranked_models(0)
                .into_iter()
                .find(|candidate| is_free_suffix(&candidate.model_suffix))
                .map(|candidate| {
                    let is_local = registry
                        .get_provider(&candidate.provider_base)
                        .map(|p| p.is_local)
                        .unwrap_or(false);
                    (candidate.provider_base, candidate.model_suffix, is_local)
                })
        }
        ModelTier::Any => {
            if let Some(best) = performance.get_ranked_models(0).into_iter().next() {
                let is_local = registry
                    .get_provider(&best.provider_base)
                    .map(|p| p.is_local)
                    .unwrap_or(false);
                return Some((best.provider_base, best.model_suffix, is_local));
            }
            registry.all_providers().find_map(|provider| {
                provider
                    .models
                    .first()
                    .map(|model| (provider.name.clone(), model.model_suffix.clone(), provider.is_local))
            })
        }
    }
}

/// Validates and resolves the requested `(provider, model)` pair, or
/// auto-selects one. Returns `(provider_base, model_suffix, is_local)`.
fn resolve_model(
    config: &AgentConfig,
    registry: &ModelRegistry,
    performance: &PerformanceTracker,
    settings: &Settings,
) -> Result<(String, String, bool)> {
    match (&config.requested_provider, &config.requested_model) {
        (Some(provider_base), Some(model_suffix)) => {
            let is_local = registry
                .get_provider(provider_base)
                .map(|p| p.is_local)
                .ok_or_else(|| Error::config(format!("unknown provider instance '{provider_base}'")))?;

            let fully_qualified = if is_local {
                format!("{provider_base}/{model_suffix}")
            } else {
                model_suffix.clone()
            };
            if !ModelKey::validate_prefix_rule(&fully_qualified, is_local) {
                return Err(Error::config(format!(
                    "model id '{fully_qualified}' does not satisfy the local/remote prefix rule for provider '{provider_base}'"
                )));
            }
            if !registry.is_model_available(provider_base, model_suffix) {
                return Err(Error::NoModelAvailable(format!("{provider_base}/{model_suffix}")));
            }
            Ok((provider_base.clone(), model_suffix.clone(), is_local))
        }
        _ => auto_select_model(registry, performance, settings.model_tier)
            .ok_or_else(|| Error::NoModelAvailable("no provider/model available for auto-selection".to_string())),
    }
}

/// Creates the agent's sandbox directory on disk. A failure here is
/// non-fatal to the caller's request in the sense that the agent id and path
/// are still assigned, but `create_agent` surfaces it as an error since a
/// missing sandbox breaks every `write`/`read` tool call the agent makes.
fn create_sandbox_dir(sandbox_path: &str) -> Result<()> {
    std::fs::create_dir_all(sandbox_path)
        .map_err(|e| Error::other(format!("failed to create sandbox directory '{sandbox_path}': {e}")))
}

/// Creates a new agent: resolves its model, validates the pair, creates its
/// sandbox directory, and returns it ready to register. Does not touch any
/// shared agent map — the caller (Agent Manager) owns insertion.
pub fn create_agent(
    requested_id: Option<String>,
    agent_type: AgentType,
    config: AgentConfig,
    team_id: Option<String>,
    registry: &ModelRegistry,
    performance: &PerformanceTracker,
    settings: &Settings,
) -> Result<(Agent, CreateAgentResult)> {
    let (provider_base, model_suffix, _is_local) = resolve_model(&config, registry, performance, settings)?;

    let id = requested_id.unwrap_or_else(|| generate_agent_id(agent_type));
    let mut agent = Agent::new(&id, agent_type, config.persona.clone());
    agent.provider_name = provider_base.clone();
    agent.model = model_suffix.clone();
    agent.temperature = config.temperature.unwrap_or(settings.default_temperature);
    agent.provider_options = config.provider_options;
    agent.team_id = team_id;

    create_sandbox_dir(&agent.sandbox_path)?;

    let message = format!("agent '{id}' created on '{provider_base}/{model_suffix}'");
    log::info!("{message}");

    Ok((
        agent,
        CreateAgentResult {
            success: true,
            message,
            agent_id: Some(id),
        },
    ))
}

/// Validates that `agent` may be deleted (bootstrap agents are protected),
/// returning the team id to detach the agent from, if any. The caller (Agent
/// Manager) performs the actual removal from its agent map.
pub fn delete_agent(agent: &Agent) -> Result<Option<String>> {
    if agent.is_bootstrap() {
        return Err(Error::config(format!(
            "agent '{}' is a bootstrap agent and cannot be deleted",
            agent.id
        )));
    }
    Ok(agent.team_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ModelInfo, ProviderInstance};
    use std::time::Duration;

    fn registry_with_ollama() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        let mut ollama = ProviderInstance::new("ollama", Some("http://localhost:11434/v1".into()), true);
        ollama.models.push(ModelInfo::new("llama3.1:8b"));
        registry.register_provider(ollama);
        registry
    }

    fn registry_with_remote() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        let mut openrouter = ProviderInstance::new("openrouter", Some("https://openrouter.ai/api/v1".into()), false);
        openrouter.models.push(ModelInfo::new("mistral-7b-instruct:free"));
        registry.register_provider(openrouter);
        registry
    }

    #[test]
    fn explicit_local_model_is_validated_and_accepted() {
        let registry = registry_with_ollama();
        let performance = PerformanceTracker::new();
        let settings = Settings::default();
        let config = AgentConfig {
            requested_provider: Some("ollama".to_string()),
            requested_model: Some("llama3.1:8b".to_string()),
            persona: "Worker".to_string(),
            ..Default::default()
        };

        let (agent, result) =
            create_agent(None, AgentType::Worker, config, None, &registry, &performance, &settings).unwrap();
        assert!(result.success);
        assert_eq!(agent.provider_name, "ollama");
        assert_eq!(agent.model, "llama3.1:8b");
        let _ = std::fs::remove_dir_all(&agent.sandbox_path);
    }

    #[test]
    fn unavailable_model_is_rejected() {
        let registry = registry_with_ollama();
        let performance = PerformanceTracker::new();
        let settings = Settings::default();
        let config = AgentConfig {
            requested_provider: Some("ollama".to_string()),
            requested_model: Some("llama3.1:405b".to_string()),
            persona: "Worker".to_string(),
            ..Default::default()
        };

        let err = create_agent(None, AgentType::Worker, config, None, &registry, &performance, &settings).unwrap_err();
        assert!(matches!(err, Error::NoModelAvailable(_)));
    }

    #[test]
    fn auto_select_under_local_tier_prefers_local_provider() {
        let registry = registry_with_ollama();
        let performance = PerformanceTracker::new();
        let mut settings = Settings::default();
        settings.model_tier = ModelTier::Local;

        let (agent, _) =
            create_agent(None, AgentType::Worker, AgentConfig::default(), None, &registry, &performance, &settings).unwrap();
        assert_eq!(agent.provider_name, "ollama");
        let _ = std::fs::remove_dir_all(&agent.sandbox_path);
    }

    #[test]
    fn auto_select_under_any_tier_uses_ranked_performance() {
        let registry = registry_with_remote();
        let mut performance = PerformanceTracker::new();
        performance.record_success("openrouter", "mistral-7b-instruct:free", Duration::from_millis(100));
        let settings = Settings::default();

        let (agent, _) =
            create_agent(None, AgentType::Pm, AgentConfig::default(), None, &registry, &performance, &settings).unwrap();
        assert_eq!(agent.provider_name, "openrouter");
        assert_eq!(agent.model, "mistral-7b-instruct:free");
        let _ = std::fs::remove_dir_all(&agent.sandbox_path);
    }

    #[test]
    fn generated_id_is_used_when_none_requested() {
        let registry = registry_with_ollama();
        let performance = PerformanceTracker::new();
        let settings = Settings::default();
        let config = AgentConfig {
            requested_provider: Some("ollama".to_string()),
            requested_model: Some("llama3.1:8b".to_string()),
            persona: "Worker".to_string(),
            ..Default::default()
        };

        let (agent, result) =
            create_agent(None, AgentType::Worker, config, None, &registry, &performance, &settings).unwrap();
        assert!(agent.id.starts_with("worker_"));
        assert_eq!(result.agent_id.as_deref(), Some(agent.id.as_str()));
        let _ = std::fs::remove_dir_all(&agent.sandbox_path);
    }

    #[test]
    fn deleting_bootstrap_agent_is_rejected() {
        let agent = Agent::new(crate::constants::BOOTSTRAP_AGENT_ID, AgentType::Admin, "Admin");
        let err = delete_agent(&agent).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn deleting_non_bootstrap_agent_returns_its_team() {
        let mut agent = Agent::new("worker_1", AgentType::Worker, "Worker");
        agent.team_id = Some("team_alpha".to_string());
        let team = delete_agent(&agent).unwrap();
        assert_eq!(team.as_deref(), Some("team_alpha"));
    }
}
