use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

use service_catalog::adapters::postgres::postgres_store::{PostgresStore, create_pool};
use service_catalog::adapters::redis::redis_cache::RedisCache;
use service_catalog::adapters::redis::redis_stream_broker::RedisStreamBroker;
use service_catalog::application::create_entry::CreateEntryHandler;
use service_catalog::application::handshake::RetryPolicy;
use service_catalog::application::publisher::Publisher;
use service_catalog::application::reader::CatalogReader;
use service_catalog::shell::config::Config;
use service_catalog::shell::http::router;
use service_catalog::shell::state::AppState;
use service_catalog::shell::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init();

    let broker = Arc::new(RedisStreamBroker::new(
        &config.broker_url,
        config.broker_partitions,
        config.poll_block,
    )?);
    // Cache and store connect on first use; while down, reads miss or answer 503.
    let cache = Arc::new(RedisCache::new(&config.cache_url).context("parsing CACHE_URL")?);
    let pool = create_pool(&config.database_url, config.database_pool_size)
        .context("parsing DATABASE_URL")?;
    let store = Arc::new(PostgresStore::new(pool));
    if let Err(e) = store.ensure_schema().await {
        tracing::warn!(error = %e, "schema setup skipped; the consumer creates it on start");
    }

    let publisher = Arc::new(Publisher::new(
        config.broker_topic.clone(),
        broker.clone(),
        broker,
        cache.clone(),
    ));
    // The handshake runs in the background; until it is Ready, creations answer 503.
    let handshake = {
        let publisher = publisher.clone();
        let policy = RetryPolicy::fixed(config.connect_max_attempts, config.connect_retry_interval);
        tokio::spawn(async move { publisher.connect(policy).await })
    };

    let state = AppState {
        create_handler: Arc::new(CreateEntryHandler::new(publisher.clone())),
        reader: CatalogReader::new(cache, store),
        publisher,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("Catalog API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    handshake.abort();
    Ok(())
}
