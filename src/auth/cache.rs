//! Keyed session cache mirroring the browser's session storage.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::identity::LegacyRecord;

/// Key of the cached legacy user record
pub const REP_KEY: &str = "sb_rep";
/// Key of the pre-token session artifact; only ever cleared
pub const SESSION_KEY: &str = "sb_session";

pub trait SessionCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Read the legacy record, ignoring anything that does not parse.
pub fn load_legacy(cache: &dyn SessionCache) -> Option<LegacyRecord> {
    let raw = cache.get(REP_KEY)?;
    match serde_json::from_str::<LegacyRecord>(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable legacy session record");
            None
        }
    }
}

pub fn store_legacy(cache: &dyn SessionCache, record: &LegacyRecord) {
    if let Ok(raw) = serde_json::to_string(record) {
        cache.set(REP_KEY, raw);
    }
}

pub fn clear_legacy(cache: &dyn SessionCache) {
    cache.remove(SESSION_KEY);
    cache.remove(REP_KEY);
}

#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_legacy(record: &LegacyRecord) -> Self {
        let cache = Self::new();
        store_legacy(&cache, record);
        cache
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

impl SessionCache for MemorySessionCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_round_trip() {
        let record = LegacyRecord {
            name: "Pat Jones".to_string(),
            role: Some("Manager".to_string()),
            ..Default::default()
        };
        let cache = MemorySessionCache::with_legacy(&record);
        assert_eq!(load_legacy(&cache), Some(record));
    }

    #[test]
    fn test_garbage_record_is_ignored() {
        let cache = MemorySessionCache::new();
        cache.set(REP_KEY, "{not json".to_string());
        assert_eq!(load_legacy(&cache), None);
    }

    #[test]
    fn test_clear_removes_both_keys() {
        let cache = MemorySessionCache::new();
        cache.set(SESSION_KEY, "x".to_string());
        cache.set(REP_KEY, "{}".to_string());
        cache.set("other", "kept".to_string());
        clear_legacy(&cache);
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("other").map(String::as_str), Some("kept"));
    }
}
