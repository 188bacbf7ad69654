/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{collections::HashMap, sync::Mutex};

use crate::{
    messages::LeaseMessage,
    types::{CellId, MasterEpoch},
};

use super::{Completion, MasterEpochError, MasterEpochHandler};

/// A volatile [`MasterEpochHandler`] that completes every operation before returning.
///
/// Epochs are lost when the handler is dropped, so it only upholds the monotonicity guarantee for the
/// lifetime of one process. Useful in tests and for cells that are never reopened.
#[derive(Default)]
pub struct InMemoryMasterEpochHandler {
    epochs: Mutex<HashMap<CellId, MasterEpoch>>,
}

impl InMemoryMasterEpochHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MasterEpochHandler for InMemoryMasterEpochHandler {
    fn request_epoch(&self, message: LeaseMessage, on_done: Completion) {
        let epoch = self
            .epochs
            .lock()
            .unwrap()
            .get(&message.cell_id)
            .copied()
            .unwrap_or_default();
        on_done.complete(Ok(message.with_master_epoch(epoch)));
    }

    fn store_epoch(&self, message: LeaseMessage, on_done: Completion) {
        let mut epochs = self.epochs.lock().unwrap();
        let stored = epochs.get(&message.cell_id).copied().unwrap_or_default();
        if message.master_epoch < stored {
            drop(epochs);
            on_done.complete(Err(MasterEpochError::EpochRegression {
                cell: message.cell_id,
                stored,
                requested: message.master_epoch,
            }));
            return;
        }
        epochs.insert(message.cell_id.clone(), message.master_epoch);
        drop(epochs);
        on_done.complete(Ok(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master_epoch::advance_epoch;

    #[test]
    fn advance_epoch_counts_up_from_one() {
        let handler = InMemoryMasterEpochHandler::new();
        let cell = CellId::new("testcell");
        assert_eq!(advance_epoch(&handler, &cell).unwrap(), MasterEpoch::new(1));
        assert_eq!(advance_epoch(&handler, &cell).unwrap(), MasterEpoch::new(2));
        assert_eq!(
            advance_epoch(&handler, &CellId::new("other")).unwrap(),
            MasterEpoch::new(1)
        );
    }

    #[test]
    fn lowering_the_epoch_is_rejected() {
        let handler = InMemoryMasterEpochHandler::new();
        let cell = CellId::new("testcell");
        advance_epoch(&handler, &cell).unwrap();
        advance_epoch(&handler, &cell).unwrap();

        let (on_done, done) = Completion::new();
        handler.store_epoch(
            LeaseMessage::new(crate::messages::MessageType::EventRestart, cell)
                .with_master_epoch(MasterEpoch::new(1)),
            on_done,
        );
        // Completed before `store_epoch` returned.
        assert!(matches!(
            done.try_get(),
            Some(Err(MasterEpochError::EpochRegression { .. }))
        ));
    }

    #[test]
    fn exhausted_epoch_is_reported() {
        let handler = InMemoryMasterEpochHandler::new();
        let cell = CellId::new("testcell");
        let (on_done, _) = Completion::new();
        handler.store_epoch(
            LeaseMessage::new(crate::messages::MessageType::EventRestart, cell.clone())
                .with_master_epoch(MasterEpoch::new(u64::MAX)),
            on_done,
        );

        assert!(matches!(
            advance_epoch(&handler, &cell),
            Err(MasterEpochError::EpochExhausted { .. })
        ));
    }
}
