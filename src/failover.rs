//! Failover Handler (C8): on cycle failure, picks the next
//! (provider, model, key) for an agent and rewrites its active
//! configuration. Grounded in `original_source`'s `agent_lifecycle.py`
//! failover section; ranking delegates to the Performance Tracker (C4) and
//! reachability/depletion checks delegate to the Model Registry (C2) and Key
//! Manager (C3).

use tokio::sync::Mutex;

use crate::agent::Agent;
use crate::error::ExceptionKind;
use crate::keys::KeyManager;
use crate::model_key::ModelKey;
use crate::performance::PerformanceTracker;
use crate::registry::ModelRegistry;
use crate::settings::{ModelTier, Settings};

/// Result of one failover attempt.
#[derive(Debug, Clone)]
pub struct FailoverOutcome {
    pub success: bool,
    pub reason: String,
}

fn is_free_suffix(model_suffix: &str) -> bool {
    model_suffix.ends_with(":free")
}

fn candidate_permitted_by_tier(tier: ModelTier, provider_is_local: bool, model_suffix: &str) -> bool {
    match tier {
        ModelTier::Local => provider_is_local,
        ModelTier::Free => provider_is_local || is_free_suffix(model_suffix),
        ModelTier::Any => true,
    }
}

/// Attempts to move `agent` off its current, just-failed (provider, model).
/// Mutates `agent.provider_name`/`agent.model`/`cycle_counters` in place on
/// success; on failure the caller is expected to mark the agent `error`.
pub async fn attempt(
    agent: &mut Agent,
    error_kind: ExceptionKind,
    registry: &ModelRegistry,
    key_manager: &Mutex<KeyManager>,
    performance: &Mutex<PerformanceTracker>,
    settings: &Settings,
) -> FailoverOutcome {
    let is_local_current = registry
        .get_provider(&agent.provider_name)
        .map(|p| p.is_local)
        .unwrap_or(false);

    if error_kind.is_key_related() {
        let mut keys = key_manager.lock().await;
        if let Some(current_key) = agent.cycle_counters.last_used_api_key.clone() {
            keys.quarantine_key(&agent.provider_name, &current_key, None);
        }
        if let Some(fresh) = keys.get_active_key_config(&agent.provider_name) {
            agent.cycle_counters.last_used_api_key = Some(fresh.api_key);
            log::info!(
                "agent '{}' rotated to a fresh key for provider '{}', model unchanged",
                agent.id,
                agent.provider_name
            );
            return FailoverOutcome {
                success: true,
                reason: "rotated API key".to_string(),
            };
        }
        log::warn!(
            "provider '{}' has no unquarantined key left for agent '{}'; falling back to model failover",
            agent.provider_name,
            agent.id
        );
    }

    // Only a genuine model-failover path marks the current model "failed
    // this cycle" — a successful key rotation keeps the same model, so it
    // must not be excluded from later candidate search within this cycle.
    let failed_key = ModelKey::new(agent.provider_name.clone(), agent.model.clone(), is_local_current);
    agent
        .cycle_counters
        .failed_models_this_cycle
        .insert(failed_key.canonical_id());

    let ranked = {
        let tracker = performance.lock().await;
        tracker.get_ranked_models(1)
    };
    let key_manager_guard = key_manager.lock().await;

    for candidate in ranked {
        if !registry.is_model_available(&candidate.provider_base, &candidate.model_suffix) {
            continue;
        }
        let provider_is_local = registry
            .get_provider(&candidate.provider_base)
            .map(|p| p.is_local)
            .unwrap_or(false);
        if !candidate_permitted_by_tier(settings.model_tier, provider_is_local, &candidate.model_suffix) {
            continue;
        }
        let candidate_key = ModelKey::new(
            candidate.provider_base.clone(),
            candidate.model_suffix.clone(),
            provider_is_local,
        );
        if agent
            .cycle_counters
            .failed_models_this_cycle
            .contains(&candidate_key.canonical_id())
        {
            continue;
        }
        if key_manager_guard.is_provider_depleted(&candidate.provider_base) {
            continue;
        }

        log::warn!(
            "failing over agent '{}' from '{}/{}' to '{}/{}'",
            agent.id,
            agent.provider_name,
            agent.model,
            candidate.provider_base,
            candidate.model_suffix
        );
        agent.provider_name = candidate.provider_base;
        agent.model = candidate.model_suffix;
        return FailoverOutcome {
            success: true,
            reason: "selected ranked model candidate".to_string(),
        };
    }

    FailoverOutcome {
        success: false,
        reason: "no reachable, non-depleted, not-yet-failed model candidate available".to_string(),
    }
}
