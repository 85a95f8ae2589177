//! Short-lived, single-shot memo of the last fetched project document.

use mgmt_client_domain::{ConfigDocument, ProjectId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct CachedSnapshot {
    stored_at: Instant,
    document: ConfigDocument,
}

/// Project documents keyed by project.
///
/// `get` hands the entry out at most once; a second read goes to the server.
/// Entries older than the TTL are dropped instead of served.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<ProjectId, CachedSnapshot>>,
}

impl SnapshotCache {
    /// Cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            ttl: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Build from an optional TTL (`None` disables the cache).
    #[must_use]
    pub fn from_ttl(ttl: Option<Duration>) -> Self {
        ttl.map_or_else(Self::disabled, Self::new)
    }

    /// Returns true when entries are stored.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    /// Take the entry for `project_id`, if present and fresh.
    pub async fn get(&self, project_id: &ProjectId) -> Option<ConfigDocument> {
        let ttl = self.ttl?;
        let cached = self.entries.lock().await.remove(project_id)?;
        if cached.stored_at.elapsed() < ttl {
            tracing::trace!(project_id = project_id.as_str(), "snapshot cache hit");
            Some(cached.document)
        } else {
            tracing::trace!(project_id = project_id.as_str(), "snapshot cache entry expired");
            None
        }
    }

    /// Store `document` as the latest snapshot of `project_id`.
    pub async fn put(&self, project_id: ProjectId, document: ConfigDocument) {
        if self.ttl.is_none() {
            return;
        }
        self.entries.lock().await.insert(
            project_id,
            CachedSnapshot {
                stored_at: Instant::now(),
                document,
            },
        );
    }

    /// Drop the entry for `project_id`.
    pub async fn invalidate(&self, project_id: &ProjectId) {
        self.entries.lock().await.remove(project_id);
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_client_shared::Result;
    use serde_json::json;

    fn project() -> Result<ProjectId> {
        Ok(ProjectId::parse("p1")?)
    }

    #[tokio::test]
    async fn entries_are_served_once() -> Result<()> {
        let cache = SnapshotCache::new(Duration::from_secs(30));
        cache
            .put(project()?, ConfigDocument::new(json!({"a": 1})))
            .await;

        let first = cache.get(&project()?).await;
        assert_eq!(first.map(ConfigDocument::into_value), Some(json!({"a": 1})));
        assert!(cache.get(&project()?).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() -> Result<()> {
        let cache = SnapshotCache::new(Duration::from_millis(10));
        cache.put(project()?, ConfigDocument::default()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(&project()?).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_drops_the_entry() -> Result<()> {
        let cache = SnapshotCache::new(Duration::from_secs(30));
        cache.put(project()?, ConfigDocument::default()).await;
        cache.invalidate(&project()?).await;

        assert!(cache.get(&project()?).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() -> Result<()> {
        let cache = SnapshotCache::from_ttl(None);
        cache.put(project()?, ConfigDocument::default()).await;

        assert!(!cache.is_enabled());
        assert!(cache.get(&project()?).await.is_none());
        Ok(())
    }
}
