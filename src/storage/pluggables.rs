/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable persistence.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io,
    path::PathBuf,
};

use borsh::BorshDeserialize;

use crate::{
    acceptor::AcceptorCellState,
    types::{CellId, MasterEpoch},
};

use super::variables::{self, concat};

/// A durable key-value store.
///
/// `write` must only return `Ok` once every change in the write batch has been committed to storage
/// that survives a crash of the process. A failed or torn `write` must leave every previously
/// committed value readable.
pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), KVStoreError>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /* ↓↓↓ Acceptor cells ↓↓↓ */

    fn acceptor_cell(&self, cell: &CellId) -> Result<Option<AcceptorCellState>, KVGetError> {
        let key = concat(&variables::ACCEPTOR_CELLS, cell.bytes());
        let bytes = self.get(&key).map_err(|err| KVGetError::StoreError {
            key: Key::AcceptorCell { cell: cell.clone() },
            source: err,
        })?;
        match bytes {
            Some(bytes) => Ok(Some(
                AcceptorCellState::deserialize(&mut bytes.as_slice()).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::AcceptorCell { cell: cell.clone() },
                        source: err,
                    }
                })?,
            )),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Master epochs ↓↓↓ */

    fn master_epoch(&self, cell: &CellId) -> Result<Option<MasterEpoch>, KVGetError> {
        let key = concat(&variables::MASTER_EPOCHS, cell.bytes());
        let bytes = self.get(&key).map_err(|err| KVGetError::StoreError {
            key: Key::MasterEpoch { cell: cell.clone() },
            source: err,
        })?;
        match bytes {
            Some(bytes) => Ok(Some(MasterEpoch::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::MasterEpoch { cell: cell.clone() },
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Failure of the underlying storage medium.
#[derive(Debug)]
pub enum KVStoreError {
    /// The operating system reported an I/O error.
    Io(io::Error),
    /// A stored record failed its format or checksum check. The record is never returned.
    Corrupted { path: PathBuf, reason: &'static str },
    /// A write was failed on purpose, see [`MemDB::fail_writes`](super::mem_db::MemDB::fail_writes).
    Injected,
}

impl Display for KVStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::Io(err) => write!(f, "I/O error: {}", err),
            KVStoreError::Corrupted { path, reason } => {
                write!(f, "corrupted record at {}: {}", path.display(), reason)
            }
            KVStoreError::Injected => write!(f, "injected write failure"),
        }
    }
}

impl Error for KVStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KVStoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for KVStoreError {
    fn from(value: io::Error) -> Self {
        KVStoreError::Io(value)
    }
}

/// Error when trying to read a typed variable from the [key value store][KVStore]. The error may arise
/// in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The store itself failed to read the value.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: io::Error },
    StoreError { key: Key, source: KVStoreError },
}

impl Display for KVGetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KVGetError::DeserializeValueError { key, source } => {
                write!(f, "failed to deserialize {}: {}", key, source)
            }
            KVGetError::StoreError { key, source } => write!(f, "failed to read {}: {}", key, source),
        }
    }
}

impl Error for KVGetError {}

/// Error when trying to serialize a typed variable into a write batch.
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: io::Error },
}

impl Display for KVSetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KVSetError::SerializeValueError { key, source } => {
                write!(f, "failed to serialize {}: {}", key, source)
            }
        }
    }
}

impl Error for KVSetError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    AcceptorCell { cell: CellId },
    MasterEpoch { cell: CellId },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::AcceptorCell { cell } => write!(f, "Acceptor state for cell {}", cell),
            Key::MasterEpoch { cell } => write!(f, "Master epoch for cell {}", cell),
        }
    }
}
