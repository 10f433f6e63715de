// In memory implementation of the EntryStore port.
//
// Purpose
// - Stand in for the durable relational store in tests and local development.
//
// Responsibilities
// - Keep one row per id; upsert replaces every column.
// - Count upserts so tests can observe redelivery.
// - Fail every call while offline.

use crate::core::catalog_entry::CatalogEntry;
use crate::core::ports::{EntryStore, StoreError, UpsertOutcome};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<i64, CatalogEntry>>,
    upserts: AtomicUsize,
    is_offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.is_offline.fetch_xor(true, Ordering::SeqCst);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.is_offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Store offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntryStore for InMemoryStore {
    async fn upsert(&self, entry: &CatalogEntry) -> Result<UpsertOutcome, StoreError> {
        self.check_online()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let previous = self.rows.write().await.insert(entry.id, entry.clone());
        Ok(match previous {
            Some(_) => UpsertOutcome::Overwritten,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CatalogEntry>, StoreError> {
        self.check_online()?;
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner_id: i64) -> Result<Vec<CatalogEntry>, StoreError> {
        self.check_online()?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|entry| entry.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        self.check_online()?;
        Ok(self.rows.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod in_memory_store_tests {
    use super::*;
    use crate::test_support::fixtures::catalog_entry::CatalogEntryBuilder;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> InMemoryStore {
        InMemoryStore::new()
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_insert_then_overwrite(store: InMemoryStore) {
        let entry = CatalogEntryBuilder::new().build();
        assert_eq!(store.upsert(&entry).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&entry).await.unwrap(), UpsertOutcome::Overwritten);
        assert_eq!(store.row_count().await, 1);
        assert_eq!(store.upsert_count(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_find_entries_by_owner(store: InMemoryStore) {
        store.upsert(&CatalogEntryBuilder::new().id(1).owner_id(7).build()).await.unwrap();
        store.upsert(&CatalogEntryBuilder::new().id(2).owner_id(8).build()).await.unwrap();
        store.upsert(&CatalogEntryBuilder::new().id(3).owner_id(7).build()).await.unwrap();

        let ids: Vec<i64> = store.find_by_owner(7).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(store.find_all().await.unwrap().len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_while_offline(store: InMemoryStore) {
        store.toggle_offline();
        let result = store.upsert(&CatalogEntryBuilder::new().build()).await;
        assert_eq!(result, Err(StoreError::Unavailable("Store offline".into())));
        assert!(store.find_by_id(1).await.is_err());
        assert_eq!(store.upsert_count(), 0);
    }
}
