// Reader: cache-aside queries over the catalog.
//
// Purpose
// - Serve lookups from the cache and fall back to the durable store on a miss.
//
// Responsibilities
// - Repopulate the cache with whatever the store returned (read-through).
// - Treat cache failures and undecodable cache values as misses.
// - Surface store failures as `ReadError::Unavailable`.
//
// Listing caveat
// - Listings scan every cached key and only ask the store when the scan finds nothing. A warm
//   but partial cache therefore returns a partial list; callers that need completeness must not
//   rely on these listings.

use crate::application::errors::ReadError;
use crate::core::catalog_entry::CatalogEntry;
use crate::core::catalog_entry::codec::{CACHE_KEY_PREFIX, cache_key, from_fields, to_fields};
use crate::core::ports::{EntryCache, EntryStore};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct CatalogReader {
    cache: Arc<dyn EntryCache>,
    store: Arc<dyn EntryStore>,
}

impl CatalogReader {
    pub fn new(cache: Arc<dyn EntryCache>, store: Arc<dyn EntryStore>) -> Self {
        Self { cache, store }
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<CatalogEntry, ReadError> {
        let key = cache_key(id);
        if let Some(entry) = self.cached(&key).await {
            debug!("cache hit");
            return Ok(entry);
        }

        debug!("cache miss");
        let entry = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(ReadError::NotFound(id))?;
        self.fill(&entry).await;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<CatalogEntry>, ReadError> {
        let cached: Vec<CatalogEntry> = self
            .scan()
            .await
            .into_iter()
            .filter(|entry| entry.owner_id == owner_id)
            .collect();
        if !cached.is_empty() {
            return Ok(cached);
        }

        let stored = self.store.find_by_owner(owner_id).await?;
        Ok(self.fill_all(stored).await)
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<CatalogEntry>, ReadError> {
        let cached = self.scan().await;
        if !cached.is_empty() {
            return Ok(cached);
        }

        let stored = self.store.find_all().await?;
        Ok(self.fill_all(stored).await)
    }

    async fn cached(&self, key: &str) -> Option<CatalogEntry> {
        match self.cache.get(key).await {
            Ok(Some(fields)) => from_fields(&fields)
                .inspect_err(|e| warn!(key, error = %e, "undecodable cache value"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Every decodable cached entry, sorted by id.
    async fn scan(&self) -> Vec<CatalogEntry> {
        let keys = match self.cache.keys(CACHE_KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "cache scan failed");
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.cached(&key).await {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    async fn fill(&self, entry: &CatalogEntry) {
        if let Err(e) = self.cache.set(&cache_key(entry.id), &to_fields(entry)).await {
            warn!(entry_id = entry.id, error = %e, "cache repopulation failed");
        }
    }

    async fn fill_all(&self, mut entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        entries.sort_by_key(|entry| entry.id);
        for entry in &entries {
            self.fill(entry).await;
        }
        entries
    }
}
