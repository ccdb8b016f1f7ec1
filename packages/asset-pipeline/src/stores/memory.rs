//! In-memory cache store, the default backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::traits::store::CacheStore;
use crate::types::cache::CacheEntry;
use crate::types::fingerprint::Fingerprint;

/// In-memory storage for cache entries and locator aliases.
///
/// Entries live as long as the process. Expired entries are evicted
/// lazily on lookup, or in bulk by [`purge_expired`](CacheStore::purge_expired).
pub struct MemoryStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    aliases: RwLock<HashMap<Fingerprint, Fingerprint>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored data.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.aliases.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Number of stored locator aliases.
    pub async fn alias_count(&self) -> usize {
        self.aliases.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.clone())),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a writer may have replaced it.
        let mut entries = self.entries.write().await;
        if entries.get(fingerprint).is_some_and(|e| e.is_expired()) {
            entries.remove(fingerprint);
            debug!(fingerprint = %fingerprint.short(), "Evicted expired cache entry");
        }
        Ok(entries.get(fingerprint).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let fingerprint = entry.fingerprint().clone();
        self.entries.write().await.insert(fingerprint, entry);
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.entries.write().await.remove(fingerprint);
        self.aliases
            .write()
            .await
            .retain(|_, content| content != fingerprint);
        Ok(())
    }

    async fn resolve_alias(&self, locator: &Fingerprint) -> Result<Option<Fingerprint>> {
        Ok(self.aliases.read().await.get(locator).cloned())
    }

    async fn put_alias(&self, locator: &Fingerprint, content: &Fingerprint) -> Result<()> {
        self.aliases
            .write()
            .await
            .insert(locator.clone(), content.clone());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            let entries = self.entries.read().await;
            self.aliases
                .write()
                .await
                .retain(|_, content| entries.contains_key(content));
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::analysis::AnalysisResult;
    use crate::types::document::{ExtractedDocument, TextBlock};
    use crate::types::source::{SourceKind, SourceRef};

    fn entry(content: &[u8], ttl: Option<u64>) -> CacheEntry {
        let source = SourceRef {
            kind: SourceKind::WebPage,
            locator: "https://example.com/a".into(),
            title: None,
        };
        let doc = ExtractedDocument::new(
            source,
            Fingerprint::from_bytes(content),
            vec![TextBlock::new("Quarterly commentary")],
        );
        CacheEntry::new(doc, ttl)
    }

    fn expired(content: &[u8]) -> CacheEntry {
        let mut e = entry(content, Some(60));
        e.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        e
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        let e = entry(b"one", Some(60));
        let fp = e.fingerprint().clone();

        store.put(e.clone()).await.unwrap();

        assert_eq!(store.get(&fp).await.unwrap(), Some(e));
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_put_replaces_wholesale() {
        let store = MemoryStore::new();
        let e = entry(b"one", Some(60));
        let fp = e.fingerprint().clone();
        store.put(e.clone()).await.unwrap();

        let result = AnalysisResult::no_data(e.document.source().clone());
        store.put(e.with_analysis(result, "v1")).await.unwrap();

        let stored = store.get(&fp).await.unwrap().unwrap();
        assert!(stored.analysis_for("v1").is_some());
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent_and_evicted() {
        let store = MemoryStore::new();
        let e = expired(b"old");
        let fp = e.fingerprint().clone();
        store.put(e).await.unwrap();

        assert_eq!(store.get(&fp).await.unwrap(), None);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_drops_aliases() {
        let store = MemoryStore::new();
        let e = entry(b"one", Some(60));
        let fp = e.fingerprint().clone();
        let locator = Fingerprint::for_locator("https://example.com/a", "\"etag\"");

        store.put(e).await.unwrap();
        store.put_alias(&locator, &fp).await.unwrap();
        assert_eq!(store.resolve_alias(&locator).await.unwrap(), Some(fp.clone()));

        store.invalidate(&fp).await.unwrap();

        assert_eq!(store.get(&fp).await.unwrap(), None);
        assert_eq!(store.resolve_alias(&locator).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        let stale = expired(b"stale");
        let stale_fp = stale.fingerprint().clone();
        store.put(stale).await.unwrap();
        store.put(entry(b"fresh", Some(60))).await.unwrap();
        store
            .put_alias(&Fingerprint::for_locator("u", "v"), &stale_fp)
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.entry_count().await, 1);
        assert_eq!(store.alias_count().await, 0);
    }
}
