// In memory implementation of the EntryCache port.
//
// Purpose
// - Stand in for the key-value cache in tests and local development.
//
// Responsibilities
// - Store flat string maps per key; a set replaces the whole record.
// - Fail every call while offline.

use crate::core::ports::{CacheError, EntryCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
    is_offline: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.is_offline.fetch_xor(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.is_offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("Cache offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntryCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<HashMap<String, String>>, CacheError> {
        self.check_online()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), fields.iter().cloned().collect());
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.check_online()?;
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn evict(&self, key: &str) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}
