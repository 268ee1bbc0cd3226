use moka::sync::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Session-scoped key-value store shared by the token provider and the report cache.
///
/// One instance per user session, owned by the caller and passed in at
/// construction. Clones share the same underlying storage, so a clone handed
/// to a `Reporter` sees everything written by an earlier one.
#[derive(Clone)]
pub struct SessionStore {
    inner: Cache<String, serde_json::Value>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        // No capacity bound and no TTL: entries live as long as the session.
        Self {
            inner: Cache::builder().build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Typed read. A value that no longer decodes as `T` reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = key, error = %e, "session value failed to decode");
                None
            }
        }
    }

    pub fn set_as<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: i64,
    }

    #[test]
    fn test_get_missing_key() {
        let store = SessionStore::new();
        assert!(store.get("nope").is_none());
        assert!(!store.contains("nope"));
    }

    #[test]
    fn test_set_overwrites() {
        let store = SessionStore::new();
        store.set("k", serde_json::json!(1));
        store.set("k", serde_json::json!(2));
        assert_eq!(store.get("k"), Some(serde_json::json!(2)));
    }

    #[test]
    fn test_clones_share_storage() {
        let store = SessionStore::new();
        let other = store.clone();
        other.set("shared", serde_json::json!("yes"));
        assert_eq!(store.get("shared"), Some(serde_json::json!("yes")));
    }

    #[test]
    fn test_separate_sessions_are_isolated() {
        let a = SessionStore::new();
        let b = SessionStore::new();
        a.set("auth", serde_json::json!("token-a"));
        assert!(b.get("auth").is_none());
    }

    #[test]
    fn test_typed_helpers() {
        let store = SessionStore::new();
        let sample = Sample {
            name: "visits".to_string(),
            count: 7,
        };
        store.set_as("sample", &sample).unwrap();
        assert_eq!(store.get_as::<Sample>("sample"), Some(sample));

        store.set("sample", serde_json::json!("not a struct"));
        assert_eq!(store.get_as::<Sample>("sample"), None);
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        store.set("k", serde_json::json!(true));
        store.remove("k");
        assert!(store.get("k").is_none());
    }
}
