/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The passive role of the lease protocol: votes on proposals and remembers, per cell, the highest
//! prepared ballot, the accepted value, and the learned value.
//!
//! An acceptor is configured and built with [`AcceptorSpec`]:
//!
//! ```ignore
//! let acceptor = AcceptorSpec::builder()
//!     .kv_store(FileDB::open("/var/lib/flease")?)
//!     .configuration(
//!         AcceptorConfiguration::builder()
//!             .me(Address::localhost(12345))
//!             .build(),
//!     )
//!     .on_learn(|event| println!("{} holds {}", event.holder, event.cell_id))
//!     .build()
//!     .start();
//!
//! let reply = acceptor.submit(prepare).recv()??;
//! ```
//!
//! [`AcceptorSpec::into_acceptor`] returns the bare state machine ([`Acceptor`]), which the caller must
//! drive from a single thread. [`AcceptorSpec::start`] returns an [`AcceptorStage`], which serializes
//! the messages of each cell on a worker thread of its own and lets different cells proceed in
//! parallel.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use crate::{
    storage::{KVGetError, KVSetError, KVStoreError},
    types::CellId,
};

pub mod cell_state;

pub mod implementation;

pub mod spec;

pub mod stage;

pub use cell_state::{AcceptedValue, AcceptorCellState};
pub use implementation::Acceptor;
pub use spec::{AcceptorConfiguration, AcceptorSpec};
pub use stage::{AcceptorReply, AcceptorStage};

/// Failure to process a message because the cell state could not be read or made durable.
///
/// Protocol conflicts are never reported through this type. They are answered with NACKs.
#[derive(Debug)]
pub enum AcceptorError {
    LoadCellState(KVGetError),
    SerializeCellState(KVSetError),
    PersistCellState { cell: CellId, source: KVStoreError },
    /// The worker thread serving the cell is gone, e.g., because an event handler panicked.
    WorkerStopped { cell: CellId },
}

impl Display for AcceptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AcceptorError::LoadCellState(err) => write!(f, "failed to load cell state: {}", err),
            AcceptorError::SerializeCellState(err) => {
                write!(f, "failed to serialize cell state: {}", err)
            }
            AcceptorError::PersistCellState { cell, source } => {
                write!(f, "failed to persist state of cell {}: {}", cell, source)
            }
            AcceptorError::WorkerStopped { cell } => {
                write!(f, "acceptor worker for cell {} has stopped", cell)
            }
        }
    }
}

impl Error for AcceptorError {}

impl From<KVGetError> for AcceptorError {
    fn from(value: KVGetError) -> Self {
        AcceptorError::LoadCellState(value)
    }
}

impl From<KVSetError> for AcceptorError {
    fn from(value: KVSetError) -> Self {
        AcceptorError::SerializeCellState(value)
    }
}
