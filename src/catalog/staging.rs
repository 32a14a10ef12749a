//! Client-side option staging for `set_option`
//!
//! The remote service keeps no per-client module state between calls, so
//! options set one at a time are held here and merged into the next execute
//! for the same module. They live only in process memory and are untouched by
//! reconnects.

use msf_core_interface::ModuleKey;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct StagedOptions {
    inner: Mutex<HashMap<ModuleKey, Map<String, Value>>>,
}

impl StagedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, key: &ModuleKey, option: impl Into<String>, value: Value) {
        let mut staged = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        staged
            .entry(key.clone())
            .or_default()
            .insert(option.into(), value);
    }

    /// Options staged for `key`
    pub fn get(&self, key: &ModuleKey) -> Map<String, Value> {
        let staged = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        staged.get(key).cloned().unwrap_or_default()
    }

    /// Staged options with `explicit` layered on top
    pub fn merged(&self, key: &ModuleKey, explicit: Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.get(key);
        merged.extend(explicit);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msf_core_interface::ModuleType;
    use serde_json::json;

    #[test]
    fn test_explicit_options_win() {
        let staged = StagedOptions::new();
        let key = ModuleKey::new(ModuleType::Exploit, "multi/handler");
        staged.stage(&key, "LHOST", json!("10.0.0.1"));
        staged.stage(&key, "LPORT", json!("4444"));

        let mut explicit = Map::new();
        explicit.insert("LPORT".into(), json!("5555"));
        let merged = staged.merged(&key, explicit);

        assert_eq!(merged["LHOST"], json!("10.0.0.1"));
        assert_eq!(merged["LPORT"], json!("5555"));
    }

    #[test]
    fn test_staging_is_per_module() {
        let staged = StagedOptions::new();
        let a = ModuleKey::new(ModuleType::Exploit, "multi/handler");
        let b = ModuleKey::new(ModuleType::Auxiliary, "multi/handler");
        staged.stage(&a, "LHOST", json!("10.0.0.1"));

        assert_eq!(staged.get(&a).len(), 1);
        assert!(staged.get(&b).is_empty());
    }
}
