// Redis Streams implementation of the broker ports.
//
// Layout
// - One stream per topic partition, named `<topic>:<partition>`. Producers route by key with
//   `partition_for`, so every event for an entry id lands on the same stream.
//
// Delivery
// - Consumers join a consumer group created at stream position `0`; a new group reads the whole
//   backlog. `XREADGROUP` keeps every read record on the consumer's pending list until `XACK`.
// - A subscription first reads its own pending list (`0`), then new records (`>`). After a
//   restart or a release, unacknowledged records come back before any new ones.
//
// Structure
// - `GroupSubscription` owns the pending-then-new state machine over a `StreamGroupReader`;
//   `RedisGroupReader` is the Redis implementation of that reader.

use crate::core::ports::{
    BrokerConnector, BrokerError, Delivery, EventProducer, EventSubscriber, EventSubscription,
    SubscriptionRequest, partition_for,
};
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamReadOptions, StreamReadReply};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const PAYLOAD_FIELD: &str = "payload";
const READ_BATCH: usize = 16;

#[derive(Clone)]
pub struct RedisStreamBroker {
    client: redis::Client,
    producer: Arc<OnceCell<ConnectionManager>>,
    partitions: u32,
    block: Duration,
}

impl RedisStreamBroker {
    /// Parse the URL without connecting; the handshake decides when the broker is reachable.
    pub fn new(url: &str, partitions: u32, block: Duration) -> Result<Self, BrokerError> {
        Ok(Self {
            client: redis::Client::open(url).map_err(rejected)?,
            producer: Arc::new(OnceCell::new()),
            partitions: partitions.max(1),
            block: block.max(Duration::from_millis(1)),
        })
    }

    async fn producer(&self) -> Result<ConnectionManager, BrokerError> {
        self.producer
            .get_or_try_init(|| self.client.get_connection_manager())
            .await
            .cloned()
            .map_err(unreachable)
    }
}

pub fn stream_key(topic: &str, partition: u32) -> String {
    format!("{topic}:{partition}")
}

fn unreachable(err: redis::RedisError) -> BrokerError {
    BrokerError::Unreachable(err.to_string())
}

fn rejected(err: redis::RedisError) -> BrokerError {
    BrokerError::Rejected(err.to_string())
}

#[async_trait::async_trait]
impl BrokerConnector for RedisStreamBroker {
    /// Fresh connection and PING on every attempt.
    async fn probe(&self) -> Result<(), BrokerError> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unreachable)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(unreachable)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventProducer for RedisStreamBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let stream = stream_key(topic, partition_for(key, self.partitions));
        let mut connection = self.producer().await?;
        let id: String = connection
            .xadd(&stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(unreachable)?;
        debug!(stream = %stream, id = %id, "record appended");
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventSubscriber for RedisStreamBroker {
    async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<Box<dyn EventSubscription>, BrokerError> {
        let partitions: Vec<u32> = match request.partitions {
            Some(assigned) => assigned,
            None => (0..self.partitions).collect(),
        };
        if let Some(bad) = partitions.iter().find(|p| **p >= self.partitions) {
            return Err(BrokerError::Rejected(format!(
                "partition {bad} does not exist on {}",
                request.topic
            )));
        }

        // Blocking reads get their own connection so producers are never stuck behind them.
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unreachable)?;

        let mut streams = Vec::with_capacity(partitions.len());
        let mut partition_of = HashMap::new();
        for partition in partitions {
            let stream = stream_key(&request.topic, partition);
            let created: Result<(), redis::RedisError> = connection
                .xgroup_create_mkstream(&stream, &request.group, "0")
                .await;
            match created {
                Ok(()) => info!(stream = %stream, group = %request.group, "consumer group created"),
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(rejected(e)),
            }
            partition_of.insert(stream.clone(), partition);
            streams.push(stream);
        }

        Ok(Box::new(GroupSubscription::new(RedisGroupReader {
            connection,
            group: request.group,
            consumer: request.consumer,
            streams,
            partition_of,
            block: self.block,
        })))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Records already delivered to this consumer and not yet acknowledged.
    Pending,
    /// Records never delivered to the group.
    New,
}

/// One consumer's view of a consumer group over its assigned streams.
#[async_trait::async_trait]
pub trait StreamGroupReader: Send {
    /// Up to one batch, oldest first. A `New` read may wait for records to arrive.
    async fn read(&mut self, from: ReadFrom) -> Result<Vec<Delivery>, BrokerError>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;
}

pub struct GroupSubscription<R> {
    reader: R,
    buffer: VecDeque<Delivery>,
    from: ReadFrom,
}

impl<R: StreamGroupReader> GroupSubscription<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: VecDeque::new(),
            from: ReadFrom::Pending,
        }
    }
}

#[async_trait::async_trait]
impl<R: StreamGroupReader> EventSubscription for GroupSubscription<R> {
    async fn poll(&mut self) -> Result<Option<Delivery>, BrokerError> {
        if self.buffer.is_empty() && self.from == ReadFrom::Pending {
            let pending = self.reader.read(ReadFrom::Pending).await?;
            if pending.is_empty() {
                self.from = ReadFrom::New;
            }
            self.buffer.extend(pending);
        }
        if self.buffer.is_empty() && self.from == ReadFrom::New {
            let fresh = self.reader.read(ReadFrom::New).await?;
            self.buffer.extend(fresh);
        }
        Ok(self.buffer.pop_front())
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.reader.ack(delivery).await
    }

    async fn release(&mut self, _delivery: &Delivery) -> Result<(), BrokerError> {
        // Everything still buffered is on the pending list too; re-read it in order.
        self.buffer.clear();
        self.from = ReadFrom::Pending;
        Ok(())
    }
}

pub struct RedisGroupReader {
    connection: MultiplexedConnection,
    group: String,
    consumer: String,
    streams: Vec<String>,
    partition_of: HashMap<String, u32>,
    block: Duration,
}

impl RedisGroupReader {
    fn stream_of(&self, delivery: &Delivery) -> Result<&str, BrokerError> {
        self.partition_of
            .iter()
            .find(|(_, partition)| **partition == delivery.partition)
            .map(|(stream, _)| stream.as_str())
            .ok_or_else(|| {
                BrokerError::Rejected(format!("partition {} not subscribed", delivery.partition))
            })
    }
}

#[async_trait::async_trait]
impl StreamGroupReader for RedisGroupReader {
    async fn read(&mut self, from: ReadFrom) -> Result<Vec<Delivery>, BrokerError> {
        let start = match from {
            ReadFrom::Pending => "0",
            ReadFrom::New => ">",
        };
        let ids = vec![start; self.streams.len()];
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(READ_BATCH);
        if from == ReadFrom::New {
            options = options.block(self.block.as_millis() as usize);
        }

        let reply: Option<StreamReadReply> = self
            .connection
            .xread_options(&self.streams, &ids, &options)
            .await
            .map_err(unreachable)?;

        let mut deliveries = Vec::new();
        for stream in reply.map(|r| r.keys).unwrap_or_default() {
            let partition = self.partition_of.get(&stream.key).copied().unwrap_or(0);
            for record in stream.ids {
                // Trimmed records come back without fields; an empty payload decodes as malformed.
                let payload: Vec<u8> = record.get(PAYLOAD_FIELD).unwrap_or_default();
                deliveries.push(Delivery {
                    partition,
                    position: record.id,
                    payload,
                });
            }
        }
        Ok(deliveries)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let stream = self.stream_of(delivery)?.to_string();
        let _: i64 = self
            .connection
            .xack(&stream, &self.group, &[&delivery.position])
            .await
            .map_err(unreachable)?;
        Ok(())
    }
}
