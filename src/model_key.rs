//! [`ModelKey`]: the (provider-instance, model-suffix) pair and its canonical
//! id.

use serde::{Deserialize, Serialize};

use crate::constants::LOCAL_PROVIDER_PREFIXES;

/// Identifies one model on one provider instance. `provider_base` is the
/// discovered/reachable instance name (e.g. a local endpoint's base url slug,
/// or a remote provider's fixed name); `model_suffix` is the provider-native
/// model id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub provider_base: String,
    pub model_suffix: String,
    pub is_local: bool,
}

impl ModelKey {
    pub fn new(provider_base: impl Into<String>, model_suffix: impl Into<String>, is_local: bool) -> Self {
        Self {
            provider_base: provider_base.into(),
            model_suffix: model_suffix.into(),
            is_local,
        }
    }

    /// Stable-across-restarts id: `provider_base/model_suffix` for local
    /// providers, bare `model_suffix` for remote ones.
    pub fn canonical_id(&self) -> String {
        if self.is_local {
            format!("{}/{}", self.provider_base, self.model_suffix)
        } else {
            self.model_suffix.clone()
        }
    }

    /// Validates a fully-qualified model id against the local/remote prefix
    /// rule: local ids must start with a known local prefix, remote ids must
    /// not.
    pub fn validate_prefix_rule(model_id: &str, is_local: bool) -> bool {
        let has_local_prefix = LOCAL_PROVIDER_PREFIXES
            .iter()
            .any(|prefix| model_id.starts_with(prefix));
        has_local_prefix == is_local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_for_local_includes_provider_base() {
        let key = ModelKey::new("ollama", "llama3.1:70b", true);
        assert_eq!(key.canonical_id(), "ollama/llama3.1:70b");
    }

    #[test]
    fn canonical_id_for_remote_is_bare_suffix() {
        let key = ModelKey::new("openrouter", "mistral-7b-instruct:free", false);
        assert_eq!(key.canonical_id(), "mistral-7b-instruct:free");
    }

    #[test]
    fn validate_prefix_rule_rejects_mismatches() {
        assert!(ModelKey::validate_prefix_rule("ollama/llama3.1", true));
        assert!(!ModelKey::validate_prefix_rule("ollama/llama3.1", false));
        assert!(ModelKey::validate_prefix_rule("gpt-4o", false));
        assert!(!ModelKey::validate_prefix_rule("gpt-4o", true));
    }
}
