// In memory implementation of the broker ports.
//
// Purpose
// - Exercise the publisher and consumer without a running broker.
//
// Responsibilities
// - Keep one ordered log per topic partition, routed by record key.
// - Track committed positions per (topic, group, partition); a subscription reads from its own
//   cursor, which starts at the committed position.
// - Dropping a subscription without acknowledging models a consumer crash: the next
//   subscription for the group redelivers everything after the last commit.
// - Simulate an unreachable broker for the next `k` probes, or for every call while offline.

use crate::core::ports::{
    BrokerConnector, BrokerError, Delivery, EventProducer, EventSubscriber, EventSubscription,
    SubscriptionRequest, partition_for,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(10);

#[derive(Default)]
struct BrokerLog {
    partitions: HashMap<String, Vec<Vec<Vec<u8>>>>,
    committed: HashMap<(String, String, u32), u64>,
}

impl BrokerLog {
    fn topic(&mut self, topic: &str, partitions: u32) -> &mut Vec<Vec<Vec<u8>>> {
        self.partitions
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions as usize])
    }
}

pub struct InMemoryBroker {
    log: Arc<Mutex<BrokerLog>>,
    partitions: u32,
    unreachable_probes: AtomicU32,
    probes: AtomicU32,
    is_offline: AtomicBool,
    idle_wait: Duration,
}

impl InMemoryBroker {
    pub fn new(partitions: u32) -> Self {
        Self {
            log: Arc::new(Mutex::new(BrokerLog::default())),
            partitions: partitions.max(1),
            unreachable_probes: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            is_offline: AtomicBool::new(false),
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Fail the next `probes` connection probes.
    pub fn unreachable_for(&self, probes: u32) {
        self.unreachable_probes.store(probes, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.is_offline.store(offline, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    /// Every record on `topic`, partition by partition.
    pub async fn records(&self, topic: &str) -> Vec<Vec<u8>> {
        let mut log = self.log.lock().await;
        log.topic(topic, self.partitions)
            .iter()
            .flat_map(|partition| partition.iter().cloned())
            .collect()
    }

    pub async fn committed(&self, topic: &str, group: &str, partition: u32) -> u64 {
        let log = self.log.lock().await;
        log.committed
            .get(&(topic.to_string(), group.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    fn check_online(&self) -> Result<(), BrokerError> {
        if self.is_offline.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable("In memory broker offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn probe(&self) -> Result<(), BrokerError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .unreachable_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrokerError::Unreachable("connection refused".into()));
        }
        self.check_online()
    }
}

#[async_trait::async_trait]
impl EventProducer for InMemoryBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.check_online()?;
        let partition = partition_for(key, self.partitions) as usize;
        let mut log = self.log.lock().await;
        log.topic(topic, self.partitions)[partition].push(payload.to_vec());
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventSubscriber for InMemoryBroker {
    async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<Box<dyn EventSubscription>, BrokerError> {
        self.check_online()?;
        let partitions = match request.partitions {
            Some(assigned) => {
                if let Some(bad) = assigned.iter().find(|p| **p >= self.partitions) {
                    return Err(BrokerError::Rejected(format!(
                        "partition {bad} does not exist on {}",
                        request.topic
                    )));
                }
                assigned
            }
            None => (0..self.partitions).collect(),
        };

        let mut cursors = HashMap::new();
        {
            let mut log = self.log.lock().await;
            log.topic(&request.topic, self.partitions);
            for partition in &partitions {
                let key = (request.topic.clone(), request.group.clone(), *partition);
                cursors.insert(*partition, log.committed.get(&key).copied().unwrap_or(0));
            }
        }

        Ok(Box::new(InMemorySubscription {
            log: self.log.clone(),
            topic: request.topic,
            group: request.group,
            partitions,
            cursors,
            next: 0,
            idle_wait: self.idle_wait,
        }))
    }
}

pub struct InMemorySubscription {
    log: Arc<Mutex<BrokerLog>>,
    topic: String,
    group: String,
    partitions: Vec<u32>,
    cursors: HashMap<u32, u64>,
    next: usize,
    idle_wait: Duration,
}

impl InMemorySubscription {
    fn take_next(&mut self, log: &BrokerLog) -> Option<Delivery> {
        let records = log.partitions.get(&self.topic)?;
        for step in 0..self.partitions.len() {
            let index = (self.next + step) % self.partitions.len();
            let partition = self.partitions[index];
            let cursor = self.cursors.get(&partition).copied().unwrap_or(0);
            if let Some(payload) = records[partition as usize].get(cursor as usize) {
                self.cursors.insert(partition, cursor + 1);
                self.next = (index + 1) % self.partitions.len();
                return Some(Delivery {
                    partition,
                    position: cursor.to_string(),
                    payload: payload.clone(),
                });
            }
        }
        None
    }
}

fn position(delivery: &Delivery) -> Result<u64, BrokerError> {
    delivery
        .position
        .parse()
        .map_err(|_| BrokerError::Rejected(format!("unknown position {}", delivery.position)))
}

#[async_trait::async_trait]
impl EventSubscription for InMemorySubscription {
    async fn poll(&mut self) -> Result<Option<Delivery>, BrokerError> {
        if self.partitions.is_empty() {
            tokio::time::sleep(self.idle_wait).await;
            return Ok(None);
        }
        let shared = self.log.clone();
        let delivery = {
            let log = shared.lock().await;
            self.take_next(&log)
        };
        if delivery.is_none() {
            tokio::time::sleep(self.idle_wait).await;
        }
        Ok(delivery)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let next = position(delivery)? + 1;
        let mut log = self.log.lock().await;
        let committed = log
            .committed
            .entry((self.topic.clone(), self.group.clone(), delivery.partition))
            .or_insert(0);
        *committed = (*committed).max(next);
        Ok(())
    }

    async fn release(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let position = position(delivery)?;
        self.cursors.insert(delivery.partition, position);
        Ok(())
    }
}

#[cfg(test)]
mod in_memory_broker_tests {
    use super::*;
    use rstest::{fixture, rstest};

    const TOPIC: &str = "catalog.entry_created";

    fn request(group: &str) -> SubscriptionRequest {
        SubscriptionRequest {
            topic: TOPIC.to_string(),
            group: group.to_string(),
            consumer: "consumer-1".to_string(),
            partitions: None,
        }
    }

    #[fixture]
    fn broker() -> InMemoryBroker {
        InMemoryBroker::new(1).with_idle_wait(Duration::ZERO)
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_deliver_records_in_order(broker: InMemoryBroker) {
        broker.send(TOPIC, "1", b"one").await.unwrap();
        broker.send(TOPIC, "2", b"two").await.unwrap();
        let mut subscription = broker.subscribe(request("g")).await.unwrap();

        let first = subscription.poll().await.unwrap().unwrap();
        let second = subscription.poll().await.unwrap().unwrap();

        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
        assert!(subscription.poll().await.unwrap().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_redeliver_unacknowledged_records_to_a_new_subscription(
        broker: InMemoryBroker,
    ) {
        broker.send(TOPIC, "1", b"one").await.unwrap();
        broker.send(TOPIC, "2", b"two").await.unwrap();
        {
            let mut subscription = broker.subscribe(request("g")).await.unwrap();
            let first = subscription.poll().await.unwrap().unwrap();
            subscription.ack(&first).await.unwrap();
            subscription.poll().await.unwrap().unwrap();
        }

        let mut subscription = broker.subscribe(request("g")).await.unwrap();
        let redelivered = subscription.poll().await.unwrap().unwrap();

        assert_eq!(redelivered.payload, b"two");
        assert_eq!(broker.committed(TOPIC, "g", 0).await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_redeliver_a_released_record_next(broker: InMemoryBroker) {
        broker.send(TOPIC, "1", b"one").await.unwrap();
        broker.send(TOPIC, "2", b"two").await.unwrap();
        let mut subscription = broker.subscribe(request("g")).await.unwrap();

        let first = subscription.poll().await.unwrap().unwrap();
        subscription.release(&first).await.unwrap();

        assert_eq!(subscription.poll().await.unwrap().unwrap(), first);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_committed_positions_per_group(broker: InMemoryBroker) {
        broker.send(TOPIC, "1", b"one").await.unwrap();
        let mut first_group = broker.subscribe(request("a")).await.unwrap();
        let delivery = first_group.poll().await.unwrap().unwrap();
        first_group.ack(&delivery).await.unwrap();

        let mut second_group = broker.subscribe(request("b")).await.unwrap();

        assert_eq!(second_group.poll().await.unwrap().unwrap().payload, b"one");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_split_partitions_between_subscriptions() {
        let broker = InMemoryBroker::new(2).with_idle_wait(Duration::ZERO);
        for id in 0..20 {
            broker.send(TOPIC, &id.to_string(), id.to_string().as_bytes()).await.unwrap();
        }
        let mut left = broker
            .subscribe(SubscriptionRequest { partitions: Some(vec![0]), ..request("g") })
            .await
            .unwrap();
        let mut right = broker
            .subscribe(SubscriptionRequest { partitions: Some(vec![1]), ..request("g") })
            .await
            .unwrap();

        let mut seen = 0;
        while let Some(delivery) = left.poll().await.unwrap() {
            assert_eq!(delivery.partition, 0);
            seen += 1;
        }
        while let Some(delivery) = right.poll().await.unwrap() {
            assert_eq!(delivery.partition, 1);
            seen += 1;
        }
        assert_eq!(seen, 20);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_unknown_partitions(broker: InMemoryBroker) {
        let result = broker
            .subscribe(SubscriptionRequest { partitions: Some(vec![3]), ..request("g") })
            .await;
        assert!(matches!(result, Err(BrokerError::Rejected(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_to_send_while_offline(broker: InMemoryBroker) {
        broker.set_offline(true);
        let result = broker.send(TOPIC, "1", b"one").await;
        assert_eq!(
            result,
            Err(BrokerError::Unreachable("In memory broker offline".into()))
        );
        assert!(broker.records(TOPIC).await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_only_the_requested_number_of_probes(broker: InMemoryBroker) {
        broker.unreachable_for(2);
        assert!(broker.probe().await.is_err());
        assert!(broker.probe().await.is_err());
        assert!(broker.probe().await.is_ok());
        assert_eq!(broker.probe_count(), 3);
    }
}
