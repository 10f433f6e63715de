// In-memory wiring of the whole service for handler tests.

use crate::adapters::in_memory::in_memory_broker::InMemoryBroker;
use crate::adapters::in_memory::in_memory_cache::InMemoryCache;
use crate::adapters::in_memory::in_memory_store::InMemoryStore;
use crate::application::create_entry::{CreateEntryHandler, IdGenerator};
use crate::application::handshake::RetryPolicy;
use crate::application::publisher::Publisher;
use crate::application::reader::CatalogReader;
use crate::shell::state::AppState;
use crate::test_support::fixtures::catalog_entry::fixed_created_at;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub const TOPIC: &str = "catalog.entry_created";

/// Hands out 1, 2, 3, ...
pub struct SequenceIds(AtomicI64);

impl SequenceIds {
    pub fn starting_at(first: i64) -> Self {
        Self(AtomicI64::new(first))
    }
}

impl IdGenerator for SequenceIds {
    fn next_id(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct TestApp {
    pub state: AppState,
    pub broker: Arc<InMemoryBroker>,
    pub cache: Arc<InMemoryCache>,
    pub store: Arc<InMemoryStore>,
}

/// A connected publisher unless the broker is made unreachable for the whole handshake.
pub async fn test_app(broker_reachable: bool) -> TestApp {
    let broker = Arc::new(InMemoryBroker::new(1));
    let cache = Arc::new(InMemoryCache::new());
    let store = Arc::new(InMemoryStore::new());
    if !broker_reachable {
        broker.unreachable_for(u32::MAX);
    }

    let publisher = Arc::new(Publisher::new(TOPIC, broker.clone(), broker.clone(), cache.clone()));
    publisher.connect(RetryPolicy::fixed(1, Duration::ZERO)).await;

    let create_handler = Arc::new(CreateEntryHandler::with(
        publisher.clone(),
        Arc::new(SequenceIds::starting_at(1)),
        Arc::new(fixed_created_at),
    ));
    let reader = CatalogReader::new(cache.clone(), store.clone());

    TestApp {
        state: AppState {
            create_handler,
            reader,
            publisher,
        },
        broker,
        cache,
        store,
    }
}
