// Consumer runner: persists "entry created" events into the durable store.
//
// Purpose
// - Apply each delivered event as an idempotent upsert keyed by entry id.
//
// Responsibilities
// - Acknowledge only after the upsert succeeded (commit-after-apply).
// - Release the delivery when the upsert fails so the broker redelivers it.
// - Acknowledge and skip payloads that cannot be decoded; they would block the partition forever.
// - Process one delivery at a time, so duplicates of an id are applied in delivery order.

use crate::application::errors::{ConsumeError, StartupError};
use crate::application::handshake::{ConnectionState, Handshake, RetryPolicy};
use crate::core::catalog_entry::codec::decode_event;
use crate::core::ports::{
    BrokerConnector, Delivery, EntryStore, EventSubscriber, EventSubscription, SubscriptionRequest,
    UpsertOutcome,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Applied(UpsertOutcome),
    Skipped,
    Released,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub applied: u64,
    pub skipped: u64,
    pub released: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Applied(_) => self.applied += 1,
            DeliveryOutcome::Skipped => self.skipped += 1,
            DeliveryOutcome::Released => self.released += 1,
        }
    }
}

pub struct CatalogConsumer {
    name: String,
    store: Arc<dyn EntryStore>,
    redelivery_backoff: Duration,
}

impl CatalogConsumer {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn EntryStore>,
        redelivery_backoff: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            redelivery_backoff,
        }
    }

    pub async fn apply(&self, payload: &[u8]) -> Result<UpsertOutcome, ConsumeError> {
        let entry = decode_event(payload)?;
        let outcome = self.store.upsert(&entry).await?;
        debug!(consumer = %self.name, entry_id = entry.id, ?outcome, "entry persisted");
        Ok(outcome)
    }

    pub async fn handle(
        &self,
        subscription: &mut dyn EventSubscription,
        delivery: &Delivery,
    ) -> DeliveryOutcome {
        match self.apply(&delivery.payload).await {
            Ok(outcome) => {
                if let Err(e) = subscription.ack(delivery).await {
                    // The upsert stands; a redelivery of this record is a harmless duplicate.
                    warn!(
                        consumer = %self.name,
                        partition = delivery.partition,
                        position = %delivery.position,
                        error = %e,
                        "ack failed after upsert"
                    );
                }
                DeliveryOutcome::Applied(outcome)
            }
            Err(ConsumeError::Malformed(e)) => {
                error!(
                    consumer = %self.name,
                    partition = delivery.partition,
                    position = %delivery.position,
                    error = %e,
                    "skipping malformed event"
                );
                if let Err(e) = subscription.ack(delivery).await {
                    warn!(consumer = %self.name, error = %e, "ack of malformed event failed");
                }
                DeliveryOutcome::Skipped
            }
            Err(ConsumeError::UpsertFailed(e)) => {
                error!(
                    consumer = %self.name,
                    partition = delivery.partition,
                    position = %delivery.position,
                    error = %e,
                    "upsert failed; leaving event unacknowledged"
                );
                if let Err(e) = subscription.release(delivery).await {
                    warn!(consumer = %self.name, error = %e, "release failed");
                }
                DeliveryOutcome::Released
            }
        }
    }

    /// Process deliveries until the subscription is idle or a delivery is released.
    pub async fn drain(&self, subscription: &mut dyn EventSubscription) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        loop {
            match subscription.poll().await {
                Ok(Some(delivery)) => {
                    let outcome = self.handle(subscription, &delivery).await;
                    stats.record(outcome);
                    if outcome == DeliveryOutcome::Released {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(consumer = %self.name, error = %e, "poll failed while draining");
                    break;
                }
            }
        }
        stats
    }

    /// Consume until `shutdown` resolves.
    pub async fn run<F>(
        &self,
        subscription: &mut dyn EventSubscription,
        shutdown: F,
    ) -> ConsumerStats
    where
        F: Future<Output = ()> + Send,
    {
        let mut stats = ConsumerStats::default();
        tokio::pin!(shutdown);
        info!(consumer = %self.name, "consuming");

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = subscription.poll() => polled,
            };

            match polled {
                Ok(Some(delivery)) => {
                    let outcome = self.handle(subscription, &delivery).await;
                    stats.record(outcome);
                    if outcome == DeliveryOutcome::Released {
                        tokio::time::sleep(self.redelivery_backoff).await;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(consumer = %self.name, error = %e, "poll failed; retrying");
                    tokio::time::sleep(self.redelivery_backoff).await;
                }
            }
        }

        info!(
            consumer = %self.name,
            applied = stats.applied,
            skipped = stats.skipped,
            released = stats.released,
            "consumer stopped"
        );
        stats
    }
}

/// Handshake with the broker, then join the consumer group.
pub async fn start_consumer(
    connector: &dyn BrokerConnector,
    subscriber: &dyn EventSubscriber,
    request: SubscriptionRequest,
    policy: RetryPolicy,
) -> Result<Box<dyn EventSubscription>, StartupError> {
    let outcome = Handshake::new("consumer", policy).establish(connector).await;
    if outcome.state != ConnectionState::Ready {
        return Err(StartupError::BrokerUnreachable {
            attempts: outcome.attempts,
        });
    }

    info!(
        topic = %request.topic,
        group = %request.group,
        consumer = %request.consumer,
        "subscribing"
    );
    Ok(subscriber.subscribe(request).await?)
}

#[cfg(test)]
mod catalog_consumer_tests {
    use super::*;
    use crate::adapters::in_memory::in_memory_broker::InMemoryBroker;
    use crate::adapters::in_memory::in_memory_store::InMemoryStore;
    use crate::core::catalog_entry::codec::encode_event;
    use crate::core::ports::EventProducer;
    use crate::test_support::fixtures::catalog_entry::CatalogEntryBuilder;
    use rstest::{fixture, rstest};

    const TOPIC: &str = "catalog.entry_created";
    const GROUP: &str = "catalog_consumer_group";

    type BeforeEachReturn = (CatalogConsumer, Arc<InMemoryBroker>, Arc<InMemoryStore>);

    #[fixture]
    fn before_each() -> BeforeEachReturn {
        let broker = Arc::new(InMemoryBroker::new(1).with_idle_wait(Duration::ZERO));
        let store = Arc::new(InMemoryStore::new());
        let consumer = CatalogConsumer::new("test-consumer", store.clone(), Duration::ZERO);
        (consumer, broker, store)
    }

    fn request() -> SubscriptionRequest {
        SubscriptionRequest {
            topic: TOPIC.to_string(),
            group: GROUP.to_string(),
            consumer: "consumer-1".to_string(),
            partitions: None,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_secs(2))
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_upsert_the_same_event_idempotently(before_each: BeforeEachReturn) {
        let (consumer, _, store) = before_each;
        let entry = CatalogEntryBuilder::new().build();
        let payload = encode_event(&entry).unwrap();

        for _ in 0..3 {
            consumer.apply(&payload).await.expect("apply failed");
        }

        assert_eq!(store.row_count().await, 1);
        assert_eq!(store.find_by_id(1).await.unwrap(), Some(entry));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_apply_and_commit_each_delivery(before_each: BeforeEachReturn) {
        let (consumer, broker, store) = before_each;
        for id in 1..=3 {
            let entry = CatalogEntryBuilder::new().id(id).build();
            broker.send(TOPIC, &id.to_string(), &encode_event(&entry).unwrap()).await.unwrap();
        }
        let mut subscription = start_consumer(broker.as_ref(), broker.as_ref(), request(), policy())
            .await
            .unwrap();

        let stats = consumer.drain(subscription.as_mut()).await;

        assert_eq!(stats, ConsumerStats { applied: 3, skipped: 0, released: 0 });
        assert_eq!(store.row_count().await, 3);
        assert_eq!(broker.committed(TOPIC, GROUP, 0).await, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_skip_malformed_events_and_keep_going(before_each: BeforeEachReturn) {
        let (consumer, broker, store) = before_each;
        broker.send(TOPIC, "x", b"{not json").await.unwrap();
        let entry = CatalogEntryBuilder::new().build();
        broker.send(TOPIC, "1", &encode_event(&entry).unwrap()).await.unwrap();
        let mut subscription = broker.subscribe(request()).await.unwrap();

        let stats = consumer.drain(subscription.as_mut()).await;

        assert_eq!(stats, ConsumerStats { applied: 1, skipped: 1, released: 0 });
        assert_eq!(store.find_by_id(1).await.unwrap(), Some(entry));
        assert_eq!(broker.committed(TOPIC, GROUP, 0).await, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_leave_failed_upserts_unacknowledged(before_each: BeforeEachReturn) {
        let (consumer, broker, store) = before_each;
        let entry = CatalogEntryBuilder::new().build();
        broker.send(TOPIC, "1", &encode_event(&entry).unwrap()).await.unwrap();
        let mut subscription = broker.subscribe(request()).await.unwrap();
        store.toggle_offline();

        let stats = consumer.drain(subscription.as_mut()).await;
        assert_eq!(stats.released, 1);
        assert_eq!(broker.committed(TOPIC, GROUP, 0).await, 0);

        store.toggle_offline();
        let stats = consumer.drain(subscription.as_mut()).await;
        assert_eq!(stats.applied, 1);
        assert_eq!(store.find_by_id(1).await.unwrap(), Some(entry));
        assert_eq!(broker.committed(TOPIC, GROUP, 0).await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reapply_after_a_crash_before_commit(before_each: BeforeEachReturn) {
        let (consumer, broker, store) = before_each;
        let entry = CatalogEntryBuilder::new().build();
        broker.send(TOPIC, "1", &encode_event(&entry).unwrap()).await.unwrap();
        {
            // Apply without acknowledging, then drop the subscription.
            let mut subscription = broker.subscribe(request()).await.unwrap();
            let delivery = subscription.poll().await.unwrap().unwrap();
            consumer.apply(&delivery.payload).await.unwrap();
        }

        let mut subscription = broker.subscribe(request()).await.unwrap();
        let stats = consumer.drain(subscription.as_mut()).await;

        assert_eq!(stats.applied, 1);
        assert_eq!(store.upsert_count(), 2);
        assert_eq!(store.row_count().await, 1);
        assert_eq!(store.find_by_id(1).await.unwrap(), Some(entry));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_stop_running_on_shutdown(before_each: BeforeEachReturn) {
        let (consumer, broker, store) = before_each;
        let entry = CatalogEntryBuilder::new().build();
        broker.send(TOPIC, "1", &encode_event(&entry).unwrap()).await.unwrap();
        let mut subscription = broker.subscribe(request()).await.unwrap();

        let shutdown = async {
            while store.row_count().await == 0 {
                tokio::task::yield_now().await;
            }
        };
        let stats = consumer.run(subscription.as_mut(), shutdown).await;

        assert_eq!(stats.applied, 1);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn it_should_fail_to_start_when_the_broker_never_answers(before_each: BeforeEachReturn) {
        let (_, broker, _) = before_each;
        broker.unreachable_for(10);

        let result = start_consumer(broker.as_ref(), broker.as_ref(), request(), policy()).await;

        assert!(matches!(
            result,
            Err(StartupError::BrokerUnreachable { attempts: 3 })
        ));
    }
}
