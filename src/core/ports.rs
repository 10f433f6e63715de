// Ports define what the pipeline needs from the outside world, without implementing it.
//
// Purpose
// - Describe the broker, the key-value cache and the durable store as traits.
//
// Responsibilities
// - Keep the application layer independent of Redis, PostgreSQL or any broker.
//
// Boundaries
// - No concrete input or output here. Adapters implement these traits in the adapters layer.
//
// Testing guidance
// - Every port has an in memory implementation with an offline toggle.

use crate::core::catalog_entry::CatalogEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("broker rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected write: {0}")]
    Rejected(String),
}

/// Opens and immediately closes a broker connection handle.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn probe(&self) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Emit one record; `key` selects the partition.
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Stable key-to-partition routing shared by every broker adapter (FNV-1a).
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let hash = key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    (hash % u64::from(partitions.max(1))) as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub topic: String,
    pub group: String,
    pub consumer: String,
    /// `None` subscribes to every partition of the topic.
    pub partitions: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition: u32,
    /// Broker position of the record within its partition.
    pub position: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<Box<dyn EventSubscription>, BrokerError>;
}

#[async_trait]
pub trait EventSubscription: Send {
    /// Wait a bounded time for the next record; `None` when nothing is available.
    async fn poll(&mut self) -> Result<Option<Delivery>, BrokerError>;

    /// Advance the committed position past `delivery`.
    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Give `delivery` back unacknowledged; its partition resumes from it on the next poll.
    async fn release(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait EntryCache: Send + Sync {
    /// `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<HashMap<String, String>>, CacheError>;

    /// Replace the whole record under `key`. No expiry.
    async fn set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError>;

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    async fn evict(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Overwritten,
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn upsert(&self, entry: &CatalogEntry) -> Result<UpsertOutcome, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<CatalogEntry>, StoreError>;
    async fn find_by_owner(&self, owner_id: i64) -> Result<Vec<CatalogEntry>, StoreError>;
    async fn find_all(&self) -> Result<Vec<CatalogEntry>, StoreError>;
}
