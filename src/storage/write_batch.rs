/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A typed wrapper around a [`WriteBatch`] that forms keys and serializes values.

use borsh::BorshSerialize;

use crate::{
    acceptor::AcceptorCellState,
    types::{CellId, MasterEpoch},
};

use super::{
    pluggables::{KVSetError, Key, WriteBatch},
    variables::{self, concat},
};

pub struct StoreWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> StoreWriteBatch<W> {
    pub fn new() -> StoreWriteBatch<W> {
        StoreWriteBatch(W::new())
    }

    /// Unwrap the untyped write batch, ready to be passed to [`KVStore::write`](super::KVStore::write).
    pub fn into_inner(self) -> W {
        self.0
    }

    /* ↓↓↓ Acceptor cells ↓↓↓ */

    pub fn set_acceptor_cell(
        &mut self,
        cell: &CellId,
        state: &AcceptorCellState,
    ) -> Result<(), KVSetError> {
        self.0.set(
            &concat(&variables::ACCEPTOR_CELLS, cell.bytes()),
            &state
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::AcceptorCell { cell: cell.clone() },
                    source: err,
                })?,
        );
        Ok(())
    }

    /* ↓↓↓ Master epochs ↓↓↓ */

    pub fn set_master_epoch(
        &mut self,
        cell: &CellId,
        epoch: MasterEpoch,
    ) -> Result<(), KVSetError> {
        self.0.set(
            &concat(&variables::MASTER_EPOCHS, cell.bytes()),
            &epoch
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::MasterEpoch { cell: cell.clone() },
                    source: err,
                })?,
        );
        Ok(())
    }
}

impl<W: WriteBatch> Default for StoreWriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}
