//! Key Manager (C3): rotates API keys per provider and quarantines depleted
//! ones. Local providers carry no keys and are never depleted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The active credential for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    pub api_key: String,
    pub referer: Option<String>,
}

#[derive(Debug, Clone)]
struct KeyState {
    quarantined_until: Option<Instant>,
}

impl KeyState {
    fn active() -> Self {
        Self { quarantined_until: None }
    }

    fn is_quarantined(&self, now: Instant) -> bool {
        matches!(self.quarantined_until, Some(until) if until > now)
    }
}

pub struct KeyManager {
    keys: HashMap<String, Vec<String>>,
    states: HashMap<(String, String), KeyState>,
    cursor: HashMap<String, usize>,
    local_providers: Vec<String>,
    default_quarantine: Duration,
}

impl KeyManager {
    pub fn new(default_quarantine: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            states: HashMap::new(),
            cursor: HashMap::new(),
            local_providers: Vec::new(),
            default_quarantine,
        }
    }

    pub fn register_provider_keys(&mut self, provider_base: impl Into<String>, keys: Vec<String>) {
        let provider_base = provider_base.into();
        for key in &keys {
            self.states
                .entry((provider_base.clone(), key.clone()))
                .or_insert_with(KeyState::active);
        }
        self.keys.insert(provider_base, keys);
    }

    pub fn mark_local(&mut self, provider_base: impl Into<String>) {
        self.local_providers.push(provider_base.into());
    }

    fn is_local(&self, provider_base: &str) -> bool {
        self.local_providers.iter().any(|p| p == provider_base)
    }

    /// Returns the next usable key for `provider_base` in round-robin order,
    /// skipping quarantined keys. `None` for a local provider (no auth
    /// needed) or when every key is quarantined.
    pub fn get_active_key_config(&mut self, provider_base: &str) -> Option<KeyConfig> {
        if self.is_local(provider_base) {
            return None;
        }

        let keys = self.keys.get(provider_base)?;
        if keys.is_empty() {
            return None;
        }

        let now = Instant::now();
        let start = *self.cursor.get(provider_base).unwrap_or(&0);

        for offset in 0..keys.len() {
            let idx = (start + offset) % keys.len();
            let key = &keys[idx];
            let quarantined = self
                .states
                .get(&(provider_base.to_string(), key.clone()))
                .map(|s| s.is_quarantined(now))
                .unwrap_or(false);

            if !quarantined {
                self.cursor.insert(provider_base.to_string(), (idx + 1) % keys.len());
                return Some(KeyConfig {
                    api_key: key.clone(),
                    referer: None,
                });
            }
        }

        None
    }

    /// `true` once every key registered for `provider_base` is quarantined.
    /// Always `false` for local providers.
    pub fn is_provider_depleted(&self, provider_base: &str) -> bool {
        if self.is_local(provider_base) {
            return false;
        }

        let Some(keys) = self.keys.get(provider_base) else {
            return false;
        };
        if keys.is_empty() {
            return false;
        }

        let now = Instant::now();
        keys.iter().all(|key| {
            self.states
                .get(&(provider_base.to_string(), key.clone()))
                .map(|s| s.is_quarantined(now))
                .unwrap_or(false)
        })
    }

    pub fn quarantine_key(&mut self, provider_base: &str, key: &str, duration: Option<Duration>) {
        let duration = duration.unwrap_or(self.default_quarantine);
        let state = self
            .states
            .entry((provider_base.to_string(), key.to_string()))
            .or_insert_with(KeyState::active);
        state.quarantined_until = Some(Instant::now() + duration);
        log::warn!("quarantined key for provider '{provider_base}' for {duration:?}");
    }
}
