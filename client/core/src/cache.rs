//! Query Cache
//!
//! Keyed cache of fetched server data, shared by every surface in the process
//! and handed to each consumer explicitly. Committing an exchange invalidates
//! the conversation's key so the next reader refetches it.

use std::fmt;

use dashmap::DashMap;
use serde_json::Value;

/// Cache key made of ordered segments, e.g. `["chat", "<workspace id>"]`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Build a key from its segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Key of a workspace's chat history
    pub fn chat(workspace_id: impl Into<String>) -> Self {
        Self(vec!["chat".to_string(), workspace_id.into()])
    }

    /// Whether `prefix` matches the leading segments of this key
    #[must_use]
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Concurrent keyed cache
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<QueryKey, Value>,
}

impl QueryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`
    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.entries.get(key).map(|v| v.clone())
    }

    /// Store a value, replacing any previous one
    pub fn set(&self, key: QueryKey, value: Value) {
        self.entries.insert(key, value);
    }

    /// Whether `key` has a cached value
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove exactly one key
    pub fn remove(&self, key: &QueryKey) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Drop every entry whose key starts with `prefix`
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        tracing::debug!(key = %prefix, removed, "Query cache invalidated");
        removed
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let cache = QueryCache::new();
        let key = QueryKey::chat("ws-1");
        cache.set(key.clone(), json!([{"question": "q"}]));

        assert!(cache.contains(&key));
        assert_eq!(cache.get(&key), Some(json!([{"question": "q"}])));
        assert_eq!(cache.get(&QueryKey::chat("ws-2")), None);
    }

    #[test]
    fn test_invalidate_matches_prefix() {
        let cache = QueryCache::new();
        cache.set(QueryKey::chat("ws-1"), json!(1));
        cache.set(QueryKey::new(["chat", "ws-1", "page-2"]), json!(2));
        cache.set(QueryKey::chat("ws-2"), json!(3));
        cache.set(QueryKey::new(["workspaces"]), json!(4));

        assert_eq!(cache.invalidate(&QueryKey::chat("ws-1")), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&QueryKey::chat("ws-2")));

        assert_eq!(cache.invalidate(&QueryKey::new(["chat"])), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_missing_key_is_noop() {
        let cache = QueryCache::new();
        cache.set(QueryKey::new(["workspaces"]), json!([]));
        assert_eq!(cache.invalidate(&QueryKey::chat("nope")), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = QueryCache::new();
        cache.set(QueryKey::chat("a"), json!("x"));
        cache.set(QueryKey::chat("b"), json!("y"));

        assert_eq!(cache.remove(&QueryKey::chat("a")), Some(json!("x")));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(QueryKey::chat("ws-1").to_string(), "[chat, ws-1]");
    }
}
