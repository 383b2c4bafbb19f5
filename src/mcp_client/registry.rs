//! Server registry: name → configuration and session slot.
//!
//! Entries keep registration order so listings and health reports are
//! deterministic. Re-registering a name replaces the entry in place.

use std::sync::Arc;

use super::lifecycle::SessionSlot;
use super::types::ServerConfig;

/// One registered server and the session slot it exclusively owns.
pub struct ServerEntry {
    pub config: ServerConfig,
    pub slot: SessionSlot,
}

impl ServerEntry {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            slot: SessionSlot::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Registration-ordered collection of [`ServerEntry`]s.
#[derive(Default)]
pub struct ServerRegistry {
    entries: Vec<Arc<ServerEntry>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the replaced entry, whose session the
    /// caller should close.
    pub fn insert(&mut self, config: ServerConfig) -> Option<Arc<ServerEntry>> {
        let entry = Arc::new(ServerEntry::new(config));
        match self.position(entry.name()) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx], entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<ServerEntry>> {
        let idx = self.position(name)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServerEntry>> {
        self.entries.iter().find(|e| e.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Snapshot of every entry in registration order.
    pub fn entries(&self) -> Vec<Arc<ServerEntry>> {
        self.entries.clone()
    }

    pub fn configs(&self) -> Vec<ServerConfig> {
        self.entries.iter().map(|e| e.config.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == name)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_registration_order() {
        let mut registry = ServerRegistry::new();
        registry.insert(ServerConfig::new("zeta", "http://z/sse"));
        registry.insert(ServerConfig::new("alpha", "http://a/sse"));
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_reinsert_replaces_in_place() {
        let mut registry = ServerRegistry::new();
        registry.insert(ServerConfig::new("S", "http://a/sse"));
        registry.insert(ServerConfig::new("T", "http://t/sse"));

        let replaced = registry.insert(ServerConfig::new("S", "http://b/sse")).unwrap();
        assert_eq!(replaced.config.url, "http://a/sse");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["S", "T"]);
        assert_eq!(registry.get("S").unwrap().config.url, "http://b/sse");
    }

    #[test]
    fn test_remove() {
        let mut registry = ServerRegistry::new();
        registry.insert(ServerConfig::new("S", "http://a/sse"));
        assert!(registry.remove("S").is_some());
        assert!(registry.remove("S").is_none());
        assert!(registry.is_empty());
        assert!(!registry.contains("S"));
    }

    #[test]
    fn test_configs_snapshot() {
        let mut registry = ServerRegistry::new();
        registry.insert(ServerConfig::new("S", "http://a/sse").with_description("docs"));
        let configs = registry.configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].description, "docs");
    }
}
