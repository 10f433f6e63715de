// Redis implementation of the EntryCache port.
//
// Purpose
// - Hold each entry as one Redis hash (`HSET entry:<id> field value ...`) with no expiry.
//
// Responsibilities
// - Delete and rewrite the hash in one MULTI block so no reader sees a mix of old and new fields.
// - Connect on first use and report an unreachable server per call as `CacheError::Unavailable`.

use crate::core::ports::{CacheError, EntryCache};
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

const SCAN_BATCH: usize = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    connection: Arc<OnceCell<ConnectionManager>>,
}

impl RedisCache {
    /// Parse the URL without connecting. The first call connects; until Redis answers, every
    /// call fails with `CacheError::Unavailable` and callers treat it as a miss.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(url).map_err(unavailable)?,
            connection: Arc::new(OnceCell::new()),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.connection
            .get_or_try_init(|| {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(1)
                    .set_connection_timeout(CONNECT_TIMEOUT);
                self.client.get_connection_manager_with_config(config)
            })
            .await
            .cloned()
            .map_err(unavailable)
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

#[async_trait::async_trait]
impl EntryCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<HashMap<String, String>>, CacheError> {
        let mut connection = self.connection().await?;
        let fields: HashMap<String, String> = connection.hgetall(key).await.map_err(unavailable)?;
        // HGETALL answers an empty map for a missing key.
        Ok((!fields.is_empty()).then_some(fields))
    }

    async fn set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .hset_multiple(key, fields)
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(unavailable)?;
        debug!(key, "cache set");
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut connection = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection)
                .await
                .map_err(unavailable)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn evict(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        connection.del::<_, ()>(key).await.map_err(unavailable)
    }
}
