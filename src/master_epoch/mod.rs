/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable, per-cell master epochs.
//!
//! A master epoch is a counter that a process bumps and durably stores every time it (re)opens a cell,
//! before it issues any lease for that cell. Leases carry the epoch they were issued under, so leases
//! issued by a previous incarnation of the process can be told apart from current ones.
//!
//! ## Ordering contract
//!
//! Both operations of [`MasterEpochHandler`] are asynchronous: they return immediately and report their
//! outcome through a [`Completion`]. The completion may fire on another thread, after the call
//! returns. A proposer must not send any PREPARE or ACCEPT stamped with a new epoch before the
//! completion of the `store_epoch` that persisted it has fired. [`advance_epoch`] does exactly this.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use crate::{
    messages::{LeaseMessage, MessageType},
    storage::{KVGetError, KVSetError, KVStoreError},
    types::{CellId, MasterEpoch},
};

pub mod completion;

pub mod in_memory;

pub mod persistent;

pub use completion::{Completion, CompletionReceiver, EpochOutcome};
pub use in_memory::InMemoryMasterEpochHandler;
pub use persistent::PersistentMasterEpochHandler;

pub trait MasterEpochHandler: Send + Sync {
    /// Fill `message.master_epoch` with the epoch currently stored for `message.cell_id` and complete
    /// `on_done` with the filled message. Cells that were never stored have epoch zero.
    fn request_epoch(&self, message: LeaseMessage, on_done: Completion);

    /// Durably store `message.master_epoch` as the epoch of `message.cell_id`, then complete `on_done`
    /// with the message. A value lower than the stored one is rejected with
    /// [`MasterEpochError::EpochRegression`].
    fn store_epoch(&self, message: LeaseMessage, on_done: Completion);
}

/// Read the stored epoch of `cell_id`, durably store its successor, and return the successor once it
/// is durable.
///
/// This is the "open cell" step of a proposer: the returned epoch is strictly greater than any epoch
/// stored for the cell by any earlier incarnation.
pub fn advance_epoch(
    handler: &dyn MasterEpochHandler,
    cell_id: &CellId,
) -> Result<MasterEpoch, MasterEpochError> {
    let (on_read, read) = Completion::new();
    handler.request_epoch(
        LeaseMessage::new(MessageType::EventRestart, cell_id.clone()),
        on_read,
    );
    let current = read.wait()?;

    let next = current
        .master_epoch
        .next()
        .ok_or_else(|| MasterEpochError::EpochExhausted {
            cell: cell_id.clone(),
        })?;
    let (on_stored, stored) = Completion::new();
    handler.store_epoch(current.with_master_epoch(next), on_stored);
    let stored = stored.wait()?;

    log::debug!("Opened cell {} with master epoch {}", cell_id, stored.master_epoch);
    Ok(stored.master_epoch)
}

#[derive(Debug)]
pub enum MasterEpochError {
    LoadEpoch(KVGetError),
    SerializeEpoch(KVSetError),
    PersistEpoch { cell: CellId, source: KVStoreError },
    EpochRegression {
        cell: CellId,
        stored: MasterEpoch,
        requested: MasterEpoch,
    },
    /// The stored epoch is the last representable one, so the cell cannot be opened again.
    EpochExhausted { cell: CellId },
    /// The handler was shut down before the operation completed.
    HandlerStopped,
    Timeout,
}

impl Display for MasterEpochError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MasterEpochError::LoadEpoch(err) => write!(f, "failed to load master epoch: {}", err),
            MasterEpochError::SerializeEpoch(err) => {
                write!(f, "failed to serialize master epoch: {}", err)
            }
            MasterEpochError::PersistEpoch { cell, source } => {
                write!(f, "failed to persist master epoch of cell {}: {}", cell, source)
            }
            MasterEpochError::EpochRegression {
                cell,
                stored,
                requested,
            } => write!(
                f,
                "refusing to lower master epoch of cell {} from {} to {}",
                cell, stored, requested
            ),
            MasterEpochError::EpochExhausted { cell } => {
                write!(f, "master epoch of cell {} cannot be advanced any further", cell)
            }
            MasterEpochError::HandlerStopped => write!(f, "master epoch handler stopped"),
            MasterEpochError::Timeout => write!(f, "timed out waiting for master epoch handler"),
        }
    }
}

impl Error for MasterEpochError {}

impl From<KVGetError> for MasterEpochError {
    fn from(value: KVGetError) -> Self {
        MasterEpochError::LoadEpoch(value)
    }
}

impl From<KVSetError> for MasterEpochError {
    fn from(value: KVSetError) -> Self {
        MasterEpochError::SerializeEpoch(value)
    }
}
