use anyhow::Context;
use std::sync::Arc;

use service_catalog::adapters::postgres::postgres_store::{PostgresStore, create_pool};
use service_catalog::adapters::redis::redis_stream_broker::RedisStreamBroker;
use service_catalog::application::consumer::{CatalogConsumer, start_consumer};
use service_catalog::application::handshake::RetryPolicy;
use service_catalog::core::ports::SubscriptionRequest;
use service_catalog::shell::config::Config;
use service_catalog::shell::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init();

    let pool = create_pool(&config.database_url, config.database_pool_size)
        .context("parsing DATABASE_URL")?;
    let store = Arc::new(PostgresStore::new(pool));
    store
        .ensure_schema()
        .await
        .context("creating the catalog_entries table")?;

    let broker = RedisStreamBroker::new(
        &config.broker_url,
        config.broker_partitions,
        config.poll_block,
    )?;
    let request = SubscriptionRequest {
        topic: config.broker_topic.clone(),
        group: config.consumer_group.clone(),
        consumer: config.consumer_name.clone(),
        partitions: config.consumer_partitions.clone(),
    };
    let policy = RetryPolicy::fixed(config.connect_max_attempts, config.connect_retry_interval);
    let mut subscription = start_consumer(&broker, &broker, request, policy)
        .await
        .context("starting the consumer")?;

    let consumer = CatalogConsumer::new(
        config.consumer_name.clone(),
        store,
        config.redelivery_backoff,
    );
    consumer
        .run(subscription.as_mut(), async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;
    Ok(())
}
