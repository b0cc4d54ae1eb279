//! Model Registry (C2): discovers reachable provider instances and the
//! models each one exposes. Read-mostly; callers call [`ModelRegistry::refresh`]
//! explicitly rather than the registry polling on its own.
//!
//! The env-var discovery convention (`{NAME}_BASE_URL`) generalizes the
//! teacher's `config.rs` `get_base_url`/`OPEN_AGENT_BASE_URL` lookup from a
//! single fixed provider to an arbitrary set of named instances.

use std::collections::HashMap;

use serde_json::Value;

/// One model a provider instance exposes.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub model_suffix: String,
    pub metadata: HashMap<String, Value>,
}

impl ModelInfo {
    pub fn new(model_suffix: impl Into<String>) -> Self {
        Self {
            model_suffix: model_suffix.into(),
            metadata: HashMap::new(),
        }
    }
}

/// A discovered or statically configured provider instance.
#[derive(Debug, Clone)]
pub struct ProviderInstance {
    pub name: String,
    pub base_url: Option<String>,
    pub is_local: bool,
    pub models: Vec<ModelInfo>,
}

impl ProviderInstance {
    pub fn new(name: impl Into<String>, base_url: Option<String>, is_local: bool) -> Self {
        Self {
            name: name.into(),
            base_url,
            is_local,
            models: Vec::new(),
        }
    }
}

/// Reachable-provider discovery and per-provider model listing.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    providers: HashMap<String, ProviderInstance>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `{NAME}_BASE_URL` (name upper-cased) for each candidate, falling
    /// back to the given default when unset.
    pub fn discover_from_env(candidates: &[(&str, &str, bool)]) -> Self {
        let mut registry = Self::new();
        for (name, default_url, is_local) in candidates {
            let env_key = format!("{}_BASE_URL", name.to_uppercase());
            let base_url = std::env::var(&env_key).ok().or_else(|| Some(default_url.to_string()));
            registry.register_provider(ProviderInstance::new(*name, base_url, *is_local));
        }
        registry
    }

    pub fn register_provider(&mut self, instance: ProviderInstance) {
        self.providers.insert(instance.name.clone(), instance);
    }

    /// Replaces one provider's model list (explicit refresh, no background polling).
    pub fn refresh_models(&mut self, provider_instance: &str, models: Vec<ModelInfo>) {
        if let Some(provider) = self.providers.get_mut(provider_instance) {
            provider.models = models;
        }
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderInstance> {
        self.providers.get(name)
    }

    pub fn get_reachable_provider_url(&self, name: &str) -> Option<&str> {
        self.providers.get(name)?.base_url.as_deref()
    }

    pub fn is_model_available(&self, provider_instance: &str, model_suffix: &str) -> bool {
        self.providers
            .get(provider_instance)
            .map(|p| p.models.iter().any(|m| m.model_suffix == model_suffix))
            .unwrap_or(false)
    }

    pub fn local_providers(&self) -> impl Iterator<Item = &ProviderInstance> {
        self.providers.values().filter(|p| p.is_local)
    }

    pub fn all_providers(&self) -> impl Iterator<Item = &ProviderInstance> {
        self.providers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_model_available_reflects_refreshed_list() {
        let mut registry = ModelRegistry::new();
        registry.register_provider(ProviderInstance::new(
            "ollama",
            Some("http://localhost:11434/v1".to_string()),
            true,
        ));
        assert!(!registry.is_model_available("ollama", "llama3.1:70b"));

        registry.refresh_models("ollama", vec![ModelInfo::new("llama3.1:70b")]);
        assert!(registry.is_model_available("ollama", "llama3.1:70b"));
        assert!(!registry.is_model_available("ollama", "llama3.1:8b"));
    }

    #[test]
    fn get_reachable_provider_url_returns_none_for_unknown_provider() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.get_reachable_provider_url("ghost"), None);
    }

    #[test]
    fn local_providers_filters_by_is_local() {
        let mut registry = ModelRegistry::new();
        registry.register_provider(ProviderInstance::new("ollama", None, true));
        registry.register_provider(ProviderInstance::new("openrouter", None, false));

        let local: Vec<_> = registry.local_providers().map(|p| p.name.as_str()).collect();
        assert_eq!(local, vec!["ollama"]);
    }
}
