// The catalog entry: the one record the pipeline moves between broker, cache and store.
//
// Purpose
// - Define the entry shape and its price type.
//
// Responsibilities
// - Keep `created_at` at microsecond precision so the cache copy and the stored row compare equal.
// - Keep prices as integer cents; never go through floating point for arithmetic.
//
// Structure
// - codec.rs: JSON event form and flat cache form.

pub mod codec;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: Price,
    #[serde(alias = "specialist_id")]
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn new(
        id: i64,
        title: impl Into<String>,
        description: impl Into<String>,
        price: Price,
        owner_id: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            price,
            owner_id,
            created_at: created_at.trunc_subsecs(6),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("price must not be negative: {0}")]
    Negative(String),

    #[error("price has more than two fractional digits: {0}")]
    TooPrecise(String),

    #[error("price is not a decimal number: {0}")]
    NotANumber(String),

    #[error("price is out of range: {0}")]
    OutOfRange(String),
}

/// Largest price the durable store holds (`NUMERIC(10, 2)`), in cents. Also exact in `f64`.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

/// Amount in `0.00..=99999999.99` with two fractional digits, held as cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(i64);

impl Price {
    pub fn from_cents(cents: i64) -> Result<Self, PriceError> {
        if cents < 0 {
            return Err(PriceError::Negative(cents.to_string()));
        }
        if cents > MAX_PRICE_CENTS {
            return Err(PriceError::OutOfRange(cents.to_string()));
        }
        Ok(Self(cents))
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    fn from_f64(value: f64) -> Result<Self, PriceError> {
        if !value.is_finite() {
            return Err(PriceError::NotANumber(value.to_string()));
        }
        if value < 0.0 {
            return Err(PriceError::Negative(value.to_string()));
        }
        let cents = (value * 100.0).round();
        if cents > MAX_PRICE_CENTS as f64 {
            return Err(PriceError::OutOfRange(value.to_string()));
        }
        // Tolerance in cents: wider than f64 error at the upper bound, narrower than a third digit.
        if (value * 100.0 - cents).abs() > 1e-3 {
            return Err(PriceError::TooPrecise(value.to_string()));
        }
        Ok(Self(cents as i64))
    }

    fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.starts_with('-') {
            return Err(PriceError::Negative(raw.to_string()));
        }
        let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PriceError::NotANumber(raw.to_string()));
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PriceError::NotANumber(raw.to_string()));
        }
        if fraction.len() > 2 {
            return Err(PriceError::TooPrecise(raw.to_string()));
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| PriceError::OutOfRange(raw.to_string()))?;
        let fraction: i64 = format!("{fraction:0<2}")
            .parse()
            .map_err(|_| PriceError::NotANumber(raw.to_string()))?;

        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction))
            .filter(|cents| *cents <= MAX_PRICE_CENTS)
            .map(Self)
            .ok_or_else(|| PriceError::OutOfRange(raw.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Price::from_f64(n),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}
