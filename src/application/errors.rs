// Error taxonomy of the pipeline.
//
// - Unavailable: broker or store unreachable. Retried only at startup.
// - NotFound: entry absent from both cache and store.
// - Malformed: event payload cannot be decoded. Skipped, never retried.
// - UpsertFailed: store write error. Retried through broker redelivery, never seen by the creator.

use crate::core::catalog_entry::codec::CodecError;
use crate::core::ports::{BrokerError, StoreError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Encode(#[from] CodecError),
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        PublishError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("entry {0} not found")]
    NotFound(i64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ReadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) | StoreError::Rejected(message) => {
                ReadError::Unavailable(message)
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsumeError {
    #[error(transparent)]
    Malformed(#[from] CodecError),

    #[error("upsert failed: {0}")]
    UpsertFailed(#[from] StoreError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateEntryError {
    #[error("principal {principal} may not create entries for owner {owner_id}")]
    Forbidden { principal: String, owner_id: i64 },

    #[error("invalid entry: {0}")]
    Invalid(String),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("broker still unreachable after {attempts} attempts")]
    BrokerUnreachable { attempts: u32 },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}
