// Shared entry codec.
//
// Purpose
// - Encode and decode a CatalogEntry for the broker (JSON) and for the cache (flat string map).
//
// Responsibilities
// - Produce cache keys of the form `entry:<id>`.
// - Report any undecodable input as `CodecError::Malformed`; callers decide whether to skip or
//   fall back.

use crate::core::catalog_entry::{CatalogEntry, Price};
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use thiserror::Error;

pub const CACHE_KEY_PREFIX: &str = "entry:";

const ID: &str = "id";
const TITLE: &str = "title";
const DESCRIPTION: &str = "description";
const PRICE: &str = "price";
const OWNER_ID: &str = "owner_id";
const CREATED_AT: &str = "created_at";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed entry: {0}")]
    Malformed(String),
}

pub fn cache_key(id: i64) -> String {
    format!("{CACHE_KEY_PREFIX}{id}")
}

pub fn encode_event(entry: &CatalogEntry) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(entry).map_err(|e| CodecError::Malformed(e.to_string()))
}

pub fn decode_event(payload: &[u8]) -> Result<CatalogEntry, CodecError> {
    let mut entry: CatalogEntry =
        serde_json::from_slice(payload).map_err(|e| CodecError::Malformed(e.to_string()))?;
    entry.created_at = entry.created_at.trunc_subsecs(6);
    Ok(entry)
}

pub fn to_fields(entry: &CatalogEntry) -> Vec<(String, String)> {
    vec![
        (ID.to_string(), entry.id.to_string()),
        (TITLE.to_string(), entry.title.clone()),
        (DESCRIPTION.to_string(), entry.description.clone()),
        (PRICE.to_string(), entry.price.to_string()),
        (OWNER_ID.to_string(), entry.owner_id.to_string()),
        (CREATED_AT.to_string(), entry.created_at.to_rfc3339()),
    ]
}

pub fn from_fields(fields: &HashMap<String, String>) -> Result<CatalogEntry, CodecError> {
    let created_at = DateTime::parse_from_rfc3339(field(fields, CREATED_AT)?)
        .map_err(|e| CodecError::Malformed(format!("{CREATED_AT}: {e}")))?
        .with_timezone(&Utc);

    Ok(CatalogEntry::new(
        parse_int(fields, ID)?,
        field(fields, TITLE)?,
        field(fields, DESCRIPTION)?,
        field(fields, PRICE)?
            .parse::<Price>()
            .map_err(|e| CodecError::Malformed(format!("{PRICE}: {e}")))?,
        parse_int(fields, OWNER_ID)?,
        created_at,
    ))
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, CodecError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| CodecError::Malformed(format!("missing field {name}")))
}

fn parse_int(fields: &HashMap<String, String>, name: &str) -> Result<i64, CodecError> {
    field(fields, name)?
        .parse()
        .map_err(|e| CodecError::Malformed(format!("{name}: {e}")))
}
