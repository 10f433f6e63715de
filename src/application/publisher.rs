// Publisher: the write half of the catalog pipeline.
//
// Purpose
// - Emit an "entry created" event to the broker, then write the entry into the cache.
//
// Responsibilities
// - Refuse every publish until the broker handshake reached `Ready`; stay refused once `Disabled`.
// - Never touch the cache when emission fails, so no entry exists only in the cache.
// - Treat the cache as best effort: a failed cache write is logged and the publish still succeeds.
//
// Consistency
// - The two writes are independent and not transactional. Until a consumer persists the event
//   the entry is cache-only; if it is evicted in that window it is unreachable until the
//   consumer catches up.

use crate::application::errors::PublishError;
use crate::application::handshake::{ConnectionState, Handshake, HandshakeOutcome, RetryPolicy};
use crate::core::catalog_entry::CatalogEntry;
use crate::core::catalog_entry::codec::{cache_key, encode_event, to_fields};
use crate::core::ports::{BrokerConnector, EntryCache, EventProducer};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

pub struct Publisher {
    topic: String,
    connector: Arc<dyn BrokerConnector>,
    producer: Arc<dyn EventProducer>,
    cache: Arc<dyn EntryCache>,
    state: RwLock<ConnectionState>,
}

impl Publisher {
    pub fn new(
        topic: impl Into<String>,
        connector: Arc<dyn BrokerConnector>,
        producer: Arc<dyn EventProducer>,
        cache: Arc<dyn EntryCache>,
    ) -> Self {
        Self {
            topic: topic.into(),
            connector,
            producer,
            cache,
            state: RwLock::new(ConnectionState::Connecting),
        }
    }

    /// Run the broker handshake once and record where it ended.
    pub async fn connect(&self, policy: RetryPolicy) -> HandshakeOutcome {
        let outcome = Handshake::new("publisher", policy)
            .establish(self.connector.as_ref())
            .await;
        *self.state.write().await = outcome.state;
        info!(
            topic = %self.topic,
            state = outcome.state.as_str(),
            attempts = outcome.attempts,
            "publisher handshake finished"
        );
        outcome
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    #[instrument(skip(self, entry), fields(entry_id = entry.id, topic = %self.topic))]
    pub async fn publish(&self, entry: CatalogEntry) -> Result<CatalogEntry, PublishError> {
        let state = self.state().await;
        if state != ConnectionState::Ready {
            return Err(PublishError::Unavailable(format!(
                "publisher is {}",
                state.as_str()
            )));
        }

        let payload = encode_event(&entry)?;
        self.producer
            .send(&self.topic, &entry.id.to_string(), &payload)
            .await
            .inspect_err(|e| warn!(error = %e, "event emission failed"))?;
        debug!("event emitted");

        if let Err(e) = self.cache.set(&cache_key(entry.id), &to_fields(&entry)).await {
            warn!(error = %e, "cache write failed after emission; reads fall back to the store");
        }

        Ok(entry)
    }
}
