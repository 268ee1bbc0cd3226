use crate::config::CacheConfig;
use crate::session::SessionStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const CACHE_SESSION_PREFIX: &str = "cache";

/// Whether results are cached and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 600,
        }
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl_secs: config.ttl_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub written_at: DateTime<Utc>,
    pub payload: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Report cache living inside a `SessionStore`, namespaced per profile id.
///
/// Stale entries are never evicted. They read as a miss until the next write
/// for the same key replaces them.
#[derive(Debug, Clone)]
pub struct ReportCache {
    session: SessionStore,
    policy: CachePolicy,
}

impl ReportCache {
    pub fn new(session: SessionStore, policy: CachePolicy) -> Self {
        Self { session, policy }
    }

    pub fn set_policy(&mut self, policy: CachePolicy) {
        self.policy = policy;
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The profile id is length-prefixed so no (profile, key) pair can spell another's.
    fn session_key(profile_id: &str, key: &str) -> String {
        format!("{CACHE_SESSION_PREFIX}/{}:{profile_id}/{key}", profile_id.len())
    }

    pub fn lookup<T: DeserializeOwned>(&self, profile_id: &str, key: &str) -> CacheLookup<T> {
        self.lookup_at(profile_id, key, Utc::now())
    }

    pub fn lookup_at<T: DeserializeOwned>(
        &self,
        profile_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> CacheLookup<T> {
        if !self.policy.enabled {
            return CacheLookup::Miss;
        }
        let Some(entry) = self
            .session
            .get_as::<CacheEntry<T>>(&Self::session_key(profile_id, key))
        else {
            return CacheLookup::Miss;
        };

        let elapsed = (now - entry.written_at).num_seconds();
        let ttl = i64::try_from(self.policy.ttl_secs).unwrap_or(i64::MAX);
        if elapsed < ttl {
            CacheLookup::Hit(entry.payload)
        } else {
            tracing::debug!(
                profile_id = profile_id,
                key = key,
                written_at = %entry.written_at,
                "cache entry stale"
            );
            CacheLookup::Miss
        }
    }

    pub fn store<T: Serialize>(&self, profile_id: &str, key: &str, payload: &T) {
        self.store_at(profile_id, key, payload, Utc::now());
    }

    pub fn store_at<T: Serialize>(
        &self,
        profile_id: &str,
        key: &str,
        payload: &T,
        now: DateTime<Utc>,
    ) {
        if !self.policy.enabled {
            return;
        }
        let entry = CacheEntry {
            written_at: now,
            payload,
        };
        if let Err(e) = self
            .session
            .set_as(Self::session_key(profile_id, key), &entry)
        {
            tracing::warn!(profile_id = profile_id, key = key, error = %e, "failed to cache result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cache(enabled: bool, ttl_secs: u64) -> ReportCache {
        ReportCache::new(SessionStore::new(), CachePolicy { enabled, ttl_secs })
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = CachePolicy::default();
        assert!(!policy.enabled);
        assert_eq!(policy.ttl_secs, 600);
    }

    #[test]
    fn test_hit_iff_elapsed_below_ttl() {
        for ttl in [1_u64, 60, 600] {
            let c = cache(true, ttl);
            c.store_at("ga:1", "k", &vec![1, 2, 3], t0());
            for elapsed in [0_i64, 1, 59, 60, 61, 599, 600, 601] {
                let now = t0() + Duration::seconds(elapsed);
                let lookup = c.lookup_at::<Vec<i32>>("ga:1", "k", now);
                assert_eq!(
                    lookup.is_hit(),
                    (elapsed as u64) < ttl,
                    "ttl={ttl} elapsed={elapsed}"
                );
            }
        }
    }

    #[test]
    fn test_hit_returns_payload() {
        let c = cache(true, 600);
        c.store_at("ga:1", "k", &"payload".to_string(), t0());
        assert_eq!(
            c.lookup_at::<String>("ga:1", "k", t0() + Duration::seconds(10)),
            CacheLookup::Hit("payload".to_string())
        );
    }

    #[test]
    fn test_disabled_cache_never_hits_or_writes() {
        let c = cache(false, 600);
        c.store_at("ga:1", "k", &1, t0());
        assert_eq!(c.lookup_at::<i32>("ga:1", "k", t0()), CacheLookup::Miss);
        assert!(!c.session().contains(&ReportCache::session_key("ga:1", "k")));
    }

    #[test]
    fn test_disabling_hides_existing_entries() {
        let mut c = cache(true, 600);
        c.store_at("ga:1", "k", &1, t0());
        c.set_policy(CachePolicy {
            enabled: false,
            ttl_secs: 600,
        });
        assert_eq!(c.lookup_at::<i32>("ga:1", "k", t0()), CacheLookup::Miss);
    }

    #[test]
    fn test_profiles_are_isolated() {
        let c = cache(true, 600);
        c.store_at("ga:1", "2024-01-012024-01-31", &"a".to_string(), t0());
        assert_eq!(
            c.lookup_at::<String>("ga:2", "2024-01-012024-01-31", t0()),
            CacheLookup::Miss
        );
    }

    #[test]
    fn test_slashes_do_not_cross_profiles() {
        let c = cache(true, 600);
        c.store_at("a", "b/c", &1, t0());
        assert_eq!(c.lookup_at::<i32>("a/b", "c", t0()), CacheLookup::Miss);
        c.store_at("a/b", "c", &2, t0());
        assert_eq!(c.lookup_at::<i32>("a", "b/c", t0()), CacheLookup::Hit(1));
        assert_eq!(c.lookup_at::<i32>("a/b", "c", t0()), CacheLookup::Hit(2));
    }

    #[test]
    fn test_stale_entry_kept_and_overwritten() {
        let c = cache(true, 60);
        c.store_at("ga:1", "k", &1, t0());
        let later = t0() + Duration::seconds(120);
        assert_eq!(c.lookup_at::<i32>("ga:1", "k", later), CacheLookup::Miss);
        assert!(c.session().contains(&ReportCache::session_key("ga:1", "k")));

        c.store_at("ga:1", "k", &2, later);
        assert_eq!(
            c.lookup_at::<i32>("ga:1", "k", later + Duration::seconds(1)),
            CacheLookup::Hit(2)
        );
    }

    #[test]
    fn test_undecodable_entry_is_miss() {
        let c = cache(true, 600);
        c.store_at("ga:1", "k", &"text".to_string(), t0());
        assert_eq!(c.lookup_at::<Vec<i32>>("ga:1", "k", t0()), CacheLookup::Miss);
    }

    #[test]
    fn test_ttl_shortened_after_write() {
        let mut c = cache(true, 600);
        c.store_at("ga:1", "k", &1, t0());
        c.set_policy(CachePolicy {
            enabled: true,
            ttl_secs: 30,
        });
        assert_eq!(
            c.lookup_at::<i32>("ga:1", "k", t0() + Duration::seconds(45)),
            CacheLookup::Miss
        );
    }
}
