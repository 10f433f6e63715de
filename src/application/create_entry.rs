// Create entry command handler: the write path in front of the publisher.
//
// Purpose
// - Turn a creation request from a verified principal into a fully populated CatalogEntry.
//
// Responsibilities
// - Only "admin" or the owner itself may create entries for an owner.
// - Assign the id once, before the event or the cache write exists. Retrying the same logical
//   creation must go through `Publisher::publish` with the already assigned entry, not here.
// - Stamp `created_at` from the handler's clock.

use crate::application::errors::CreateEntryError;
use crate::application::publisher::Publisher;
use crate::core::catalog_entry::{CatalogEntry, Price};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const ADMIN_PRINCIPAL: &str = "admin";
const MAX_TITLE_LEN: usize = 255;
const ID_SPACE: u128 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(alias = "specialist_id")]
    pub owner_id: i64,
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> i64;
}

/// Ids in `[0, 10^9)` drawn from the random bits of a UUIDv7.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> i64 {
        (Uuid::now_v7().as_u128() % ID_SPACE) as i64
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct CreateEntryHandler {
    publisher: Arc<Publisher>,
    ids: Arc<dyn IdGenerator>,
    clock: Clock,
}

impl CreateEntryHandler {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self::with(publisher, Arc::new(RandomIdGenerator), Arc::new(Utc::now))
    }

    pub fn with(publisher: Arc<Publisher>, ids: Arc<dyn IdGenerator>, clock: Clock) -> Self {
        Self {
            publisher,
            ids,
            clock,
        }
    }

    pub async fn handle(
        &self,
        principal: &str,
        command: CreateEntry,
    ) -> Result<CatalogEntry, CreateEntryError> {
        if principal != ADMIN_PRINCIPAL && principal != command.owner_id.to_string() {
            return Err(CreateEntryError::Forbidden {
                principal: principal.to_string(),
                owner_id: command.owner_id,
            });
        }
        let title = command.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(CreateEntryError::Invalid(format!(
                "title must be 1 to {MAX_TITLE_LEN} characters"
            )));
        }

        let entry = CatalogEntry::new(
            self.ids.next_id(),
            title,
            command.description,
            command.price,
            command.owner_id,
            (self.clock)(),
        );
        let entry = self.publisher.publish(entry).await?;
        info!(entry_id = entry.id, owner_id = entry.owner_id, "catalog entry created");
        Ok(entry)
    }
}
