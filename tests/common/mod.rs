// Helpers shared by the integration tests.

use chrono::{DateTime, TimeZone, Utc};
use service_catalog::core::catalog_entry::{CatalogEntry, Price};

pub const TOPIC: &str = "catalog.entry_created";
pub const GROUP: &str = "catalog_consumer_group";

pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

pub fn entry(id: i64, owner_id: i64, cents: i64) -> CatalogEntry {
    CatalogEntry::new(
        id,
        "Haircut",
        "Classic cut and wash",
        Price::from_cents(cents).unwrap(),
        owner_id,
        created_at(),
    )
}
