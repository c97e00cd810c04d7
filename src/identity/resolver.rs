//! Bidirectional identity cache between Slack user ids and the identifiers
//! monday.com assignee columns use (email preferred, display name fallback).
//!
//! Both directions live for the process lifetime. Reverse misses are not
//! remembered unless a negative TTL is configured, so an identifier that
//! starts matching later is picked up on the next lookup.
//!
//! Lookup failures are logged and reported as "no mapping"; nothing here
//! returns an error to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use super::{DirectoryService, DirectoryUser};
use crate::cache::TtlCache;
use crate::classifier::normalize_identifier;

pub struct IdentityResolver {
    directory: Arc<dyn DirectoryService>,
    /// Slack user id -> directory identifier.
    forward: DashMap<String, String>,
    /// Normalized identifier -> Slack user id.
    reverse: DashMap<String, String>,
    /// Normalized identifiers recently proven unmatchable.
    negative: Option<TtlCache<String, ()>>,
    /// Held for the duration of a directory enumeration so concurrent misses
    /// share one scan.
    scan_lock: AsyncMutex<()>,
}

/// First-seen lookup tables over one directory enumeration.
struct DirectoryIndex<'a> {
    by_email: HashMap<String, &'a str>,
    by_real_name: HashMap<String, &'a str>,
    by_display_name: HashMap<String, &'a str>,
}

impl<'a> DirectoryIndex<'a> {
    fn build(users: &'a [DirectoryUser]) -> Self {
        let mut index = DirectoryIndex {
            by_email: HashMap::new(),
            by_real_name: HashMap::new(),
            by_display_name: HashMap::new(),
        };

        for user in users.iter().filter(|u| u.is_matchable()) {
            let id = user.id.as_str();
            let fields = [
                (&user.email, &mut index.by_email),
                (&user.real_name, &mut index.by_real_name),
                (&user.display_name, &mut index.by_display_name),
            ];
            for (field, table) in fields {
                if let Some(value) = field.as_deref().map(normalize_identifier) {
                    if !value.is_empty() {
                        table.entry(value).or_insert(id);
                    }
                }
            }
        }

        index
    }

    /// Email beats real name beats display name; enumeration order breaks ties.
    fn lookup(&self, normalized: &str) -> Option<&'a str> {
        self.by_email
            .get(normalized)
            .or_else(|| self.by_real_name.get(normalized))
            .or_else(|| self.by_display_name.get(normalized))
            .copied()
    }
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn DirectoryService>) -> Self {
        Self {
            directory,
            forward: DashMap::new(),
            reverse: DashMap::new(),
            negative: None,
            scan_lock: AsyncMutex::new(()),
        }
    }

    /// Remember reverse misses for `ttl` instead of rescanning every time.
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative = Some(TtlCache::new(ttl));
        self
    }

    /// Slack user id -> email, or real/display name when no email is set.
    pub async fn resolve_directory_identifier(&self, messaging_user_id: &str) -> Option<String> {
        if let Some(cached) = self.forward.get(messaging_user_id) {
            return Some(cached.value().clone());
        }

        let user = match self.directory.get_user(messaging_user_id).await {
            Ok(user) => user,
            Err(e) => {
                log::error!("Identity: profile lookup for {} failed: {}", messaging_user_id, e);
                return None;
            }
        };

        if let Some(email) = user.email {
            log::info!("Identity: mapped {} to email {}", messaging_user_id, email);
            self.forward
                .insert(messaging_user_id.to_string(), email.clone());
            self.reverse
                .insert(normalize_identifier(&email), messaging_user_id.to_string());
            return Some(email);
        }

        match user.real_name.or(user.display_name) {
            Some(name) => {
                log::info!("Identity: no email for {}, using name {}", messaging_user_id, name);
                self.forward.insert(messaging_user_id.to_string(), name.clone());
                Some(name)
            }
            None => {
                log::warn!("Identity: no email or name for {}", messaging_user_id);
                None
            }
        }
    }

    /// Directory identifier -> Slack user id.
    pub async fn resolve_messaging_user_id(&self, identifier: &str) -> Option<String> {
        self.resolve_many_messaging_user_ids([identifier])
            .await
            .remove(identifier)
    }

    /// Resolve many identifiers with at most one directory enumeration.
    ///
    /// The returned map is keyed by the identifiers as given; unresolved
    /// identifiers are absent.
    pub async fn resolve_many_messaging_user_ids<I, S>(&self, identifiers: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = HashMap::new();
        let mut pending: Vec<(String, String)> = Vec::new();

        for identifier in identifiers {
            let original = identifier.as_ref();
            let normalized = normalize_identifier(original);
            if normalized.is_empty() || resolved.contains_key(original) {
                continue;
            }
            if let Some(id) = self.reverse.get(&normalized) {
                resolved.insert(original.to_string(), id.value().clone());
            } else if !self.is_negative(&normalized) {
                pending.push((original.to_string(), normalized));
            }
        }

        if pending.is_empty() {
            return resolved;
        }

        let _scan = self.scan_lock.lock().await;

        // Another caller may have finished a scan while we waited.
        pending.retain(|(original, normalized)| match self.reverse.get(normalized) {
            Some(id) => {
                resolved.insert(original.clone(), id.value().clone());
                false
            }
            None => true,
        });
        if pending.is_empty() {
            return resolved;
        }

        let users = match self.directory.list_users().await {
            Ok(users) => users,
            Err(e) => {
                log::error!(
                    "Identity: directory enumeration failed, {} identifier(s) left unresolved: {}",
                    pending.len(),
                    e
                );
                return resolved;
            }
        };

        let index = DirectoryIndex::build(&users);
        for (original, normalized) in pending {
            match index.lookup(&normalized) {
                Some(id) => {
                    self.reverse.insert(normalized, id.to_string());
                    resolved.insert(original, id.to_string());
                }
                None => {
                    log::warn!("Identity: no directory member matches '{}'", original);
                    if let Some(ref negative) = self.negative {
                        negative.set_default(normalized, ());
                    }
                }
            }
        }

        resolved
    }

    /// Forget one user's mappings, or everything when `messaging_user_id` is `None`.
    pub fn clear_cache(&self, messaging_user_id: Option<&str>) {
        match messaging_user_id {
            Some(user_id) => {
                self.forward.remove(user_id);
                self.reverse.retain(|_, id| id.as_str() != user_id);
            }
            None => {
                self.forward.clear();
                self.reverse.clear();
                if let Some(ref negative) = self.negative {
                    negative.clear();
                }
            }
        }
    }

    /// Number of cached (forward, reverse) mappings.
    pub fn cached_counts(&self) -> (usize, usize) {
        (self.forward.len(), self.reverse.len())
    }

    fn is_negative(&self, normalized: &str) -> bool {
        self.negative
            .as_ref()
            .is_some_and(|n| n.has(&normalized.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::DirectoryError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory directory that counts calls.
    pub(crate) struct FakeDirectory {
        pub users: Vec<DirectoryUser>,
        pub fail: bool,
        pub list_calls: AtomicUsize,
        pub get_calls: AtomicUsize,
    }

    impl FakeDirectory {
        pub fn new(users: Vec<DirectoryUser>) -> Self {
            Self {
                users,
                fail: false,
                list_calls: AtomicUsize::new(0),
                get_calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(vec![])
            }
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectoryService for FakeDirectory {
        async fn get_user(&self, user_id: &str) -> Result<DirectoryUser, DirectoryError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DirectoryError::RequestFailed("connection reset".into()));
            }
            self.users
                .iter()
                .find(|u| u.id == user_id)
                .cloned()
                .ok_or_else(|| DirectoryError::UserNotFound(user_id.to_string()))
        }

        async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers can pile up behind the scan lock.
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                return Err(DirectoryError::Api("ratelimited".into()));
            }
            Ok(self.users.clone())
        }
    }

    pub(crate) fn user(id: &str, email: Option<&str>, real: Option<&str>, display: Option<&str>) -> DirectoryUser {
        DirectoryUser {
            id: id.to_string(),
            email: email.map(String::from),
            real_name: real.map(String::from),
            display_name: display.map(String::from),
            is_bot: false,
            deleted: false,
        }
    }

    fn directory() -> Arc<FakeDirectory> {
        let mut bot = user("B1", Some("bot@example.com"), Some("Deploy Bot"), None);
        bot.is_bot = true;
        let mut gone = user("U0", Some("ada@example.com"), Some("Ada Old"), None);
        gone.deleted = true;
        Arc::new(FakeDirectory::new(vec![
            bot,
            gone,
            user("U1", Some("Ada@Example.com"), Some("Ada Lovelace"), Some("ada")),
            user("U2", Some("grace@example.com"), Some("Grace Hopper"), Some("grace")),
            user("U3", None, Some("Alan Turing"), Some("alan")),
            user("U4", None, Some("Alan Turing"), Some("turing")),
            user("U5", Some("ghopper@example.com"), Some("Grace Hopper Jr"), Some("Grace Hopper")),
        ]))
    }

    #[tokio::test]
    async fn test_forward_prefers_email_and_seeds_reverse() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone());

        let id = resolver.resolve_directory_identifier("U1").await;
        assert_eq!(id.as_deref(), Some("Ada@Example.com"));

        // Cached both ways: no profile fetch, no enumeration.
        assert_eq!(
            resolver.resolve_directory_identifier("U1").await.as_deref(),
            Some("Ada@Example.com")
        );
        assert_eq!(
            resolver.resolve_messaging_user_id(" ada@example.com ").await.as_deref(),
            Some("U1")
        );
        assert_eq!(dir.get_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dir.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_forward_falls_back_to_name() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone());
        assert_eq!(
            resolver.resolve_directory_identifier("U3").await.as_deref(),
            Some("Alan Turing")
        );
        // Name fallbacks are not seeded in the reverse direction.
        assert_eq!(resolver.cached_counts(), (1, 0));
    }

    #[tokio::test]
    async fn test_forward_failure_is_none() {
        let resolver = IdentityResolver::new(Arc::new(FakeDirectory::failing()));
        assert!(resolver.resolve_directory_identifier("U1").await.is_none());
    }

    #[tokio::test]
    async fn test_reverse_skips_bots_and_deactivated() {
        let resolver = IdentityResolver::new(directory());
        assert_eq!(
            resolver.resolve_messaging_user_id("ada@example.com").await.as_deref(),
            Some("U1")
        );
        assert!(resolver.resolve_messaging_user_id("bot@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_reverse_field_priority_and_order() {
        let resolver = IdentityResolver::new(directory());
        // Real name of U2 beats display name of U5.
        assert_eq!(
            resolver.resolve_messaging_user_id("grace hopper").await.as_deref(),
            Some("U2")
        );
        // Two identical real names: first in enumeration order.
        assert_eq!(
            resolver.resolve_messaging_user_id("alan turing").await.as_deref(),
            Some("U3")
        );
        // Display name as last resort.
        assert_eq!(
            resolver.resolve_messaging_user_id("Turing").await.as_deref(),
            Some("U4")
        );
    }

    #[tokio::test]
    async fn test_batch_uses_one_enumeration_and_is_idempotent() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone());
        let ids = ["ada@example.com", "grace@example.com", "Alan Turing", "nobody@example.com"];

        let first = resolver.resolve_many_messaging_user_ids(ids).await;
        assert_eq!(dir.list_calls(), 1);
        assert_eq!(first.len(), 3);
        assert_eq!(first.get("Alan Turing").map(String::as_str), Some("U3"));
        assert!(!first.contains_key("nobody@example.com"));

        let second = resolver.resolve_many_messaging_user_ids(ids).await;
        assert_eq!(first, second);
        // The unmatched identifier is retried; everything else is a cache hit.
        assert_eq!(dir.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_fully_cached_batch_skips_enumeration() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone());
        let ids = ["ada@example.com", "grace@example.com"];

        let first = resolver.resolve_many_messaging_user_ids(ids).await;
        let second = resolver.resolve_many_messaging_user_ids(ids).await;
        assert_eq!(first, second);
        assert_eq!(dir.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_ttl_suppresses_rescans() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone()).with_negative_ttl(Duration::from_secs(60));

        assert!(resolver.resolve_messaging_user_id("nobody").await.is_none());
        assert!(resolver.resolve_messaging_user_id("nobody").await.is_none());
        assert_eq!(dir.list_calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(resolver.resolve_messaging_user_id("nobody").await.is_none());
        assert_eq!(dir.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_enumeration() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone());
        let ids = ["ada@example.com", "grace@example.com"];

        let (a, b) = tokio::join!(
            resolver.resolve_many_messaging_user_ids(ids),
            resolver.resolve_many_messaging_user_ids(ids)
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(dir.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_enumeration_failure_omits_keys() {
        let dir = Arc::new(FakeDirectory::failing());
        let resolver = IdentityResolver::new(dir.clone());
        let resolved = resolver
            .resolve_many_messaging_user_ids(["ada@example.com", "grace@example.com"])
            .await;
        assert!(resolved.is_empty());
        assert_eq!(dir.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_for_one_user() {
        let dir = directory();
        let resolver = IdentityResolver::new(dir.clone());
        resolver.resolve_directory_identifier("U1").await;
        resolver.resolve_directory_identifier("U2").await;
        assert_eq!(resolver.cached_counts(), (2, 2));

        resolver.clear_cache(Some("U1"));
        assert_eq!(resolver.cached_counts(), (1, 1));

        resolver.clear_cache(None);
        assert_eq!(resolver.cached_counts(), (0, 0));
    }
}
