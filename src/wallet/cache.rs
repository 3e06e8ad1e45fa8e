use std::collections::HashMap;
use std::sync::Mutex;

use crate::providers::SharedProvider;

type CacheKey = (String, String);

/// Live provider handles keyed by `(agent_id, wallet_id)`.
///
/// Holds provider handles only; never decrypted secrets.
#[derive(Default)]
pub struct ConnectionCache {
    entries: Mutex<HashMap<CacheKey, SharedProvider>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, SharedProvider>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, agent_id: &str, wallet_id: &str) -> Option<SharedProvider> {
        self.lock()
            .get(&(agent_id.to_string(), wallet_id.to_string()))
            .cloned()
    }

    pub fn set(&self, agent_id: &str, wallet_id: &str, provider: SharedProvider) {
        self.lock()
            .insert((agent_id.to_string(), wallet_id.to_string()), provider);
    }

    /// Returns whether an entry was dropped.
    pub fn clear(&self, agent_id: &str, wallet_id: &str) -> bool {
        self.lock()
            .remove(&(agent_id.to_string(), wallet_id.to_string()))
            .is_some()
    }

    /// Drop every entry of `agent_id`; returns how many.
    pub fn clear_agent(&self, agent_id: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(agent, _), _| agent != agent_id);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionCache").field("entries", &self.len()).finish()
    }
}
