//! Storage trait for the dedup/cache layer.
//!
//! Two kinds of key share the store:
//! - content fingerprints, mapping to a [`CacheEntry`]
//! - locator fingerprints (URL + validator), mapping to a content fingerprint

use async_trait::async_trait;

use crate::error::Result;
use crate::types::cache::CacheEntry;
use crate::types::fingerprint::Fingerprint;

/// Cache of extracted documents and analyses keyed by fingerprint.
///
/// Reads may run concurrently. Writers replace entries wholesale; the
/// controller serializes writers for one fingerprint.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch an entry. Expired entries are treated as absent and evicted.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Store (or replace) the entry under its document's fingerprint.
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Drop an entry and every alias pointing at it.
    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<()>;

    /// Content fingerprint previously recorded for a locator fingerprint.
    async fn resolve_alias(&self, locator: &Fingerprint) -> Result<Option<Fingerprint>>;

    /// Record that a locator fingerprint resolved to `content`.
    async fn put_alias(&self, locator: &Fingerprint, content: &Fingerprint) -> Result<()>;

    /// Evict every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
