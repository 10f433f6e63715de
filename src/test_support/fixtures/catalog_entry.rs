// Shared test fixture for catalog entries.
// Compiled only for unit tests; integration tests under `tests/` carry their own helper.

use crate::core::catalog_entry::{CatalogEntry, Price};
use chrono::{DateTime, TimeZone, Utc};

pub struct CatalogEntryBuilder {
    inner: CatalogEntry,
}

impl Default for CatalogEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl CatalogEntryBuilder {
    pub fn new() -> Self {
        Self {
            inner: CatalogEntry::new(
                1,
                "Haircut",
                "Classic cut and wash",
                Price::from_cents(2000).expect("fixture price"),
                7,
                fixed_created_at(),
            ),
        }
    }

    pub fn id(mut self, v: i64) -> Self {
        self.inner.id = v;
        self
    }

    pub fn title(mut self, v: impl Into<String>) -> Self {
        self.inner.title = v.into();
        self
    }

    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.inner.description = v.into();
        self
    }

    pub fn price_cents(mut self, v: i64) -> Self {
        self.inner.price = Price::from_cents(v).expect("fixture price");
        self
    }

    pub fn owner_id(mut self, v: i64) -> Self {
        self.inner.owner_id = v;
        self
    }

    pub fn created_at(mut self, v: DateTime<Utc>) -> Self {
        self.inner.created_at = v;
        self
    }

    pub fn build(self) -> CatalogEntry {
        self.inner
    }
}

pub fn fixed_created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
        .single()
        .expect("fixture timestamp")
}
