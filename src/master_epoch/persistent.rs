/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A [`MasterEpochHandler`] that persists epochs in a [`KVStore`] from a worker thread of its own.

use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::{
    messages::LeaseMessage,
    storage::{KVStore, StoreWriteBatch},
    types::{CellId, MasterEpoch},
};

use super::{Completion, MasterEpochError, MasterEpochHandler};

enum EpochRequest {
    Request(LeaseMessage, Completion),
    Store(LeaseMessage, Completion),
}

/// A handle to the worker thread of a persistent master epoch handler. When this value is dropped, the
/// worker finishes the requests already submitted and exits.
///
/// The worker reads each cell's epoch from the store the first time the cell is used after `start`,
/// so a handler restarted over the same store always observes the last durably stored epoch.
pub struct PersistentMasterEpochHandler {
    requests: Mutex<Option<Sender<EpochRequest>>>,
    worker: Option<JoinHandle<()>>,
}

impl PersistentMasterEpochHandler {
    pub fn start<K: KVStore>(kv_store: K) -> PersistentMasterEpochHandler {
        let (requests, request_receiver) = mpsc::channel();
        let worker = thread::spawn(move || run_worker(kv_store, request_receiver));
        PersistentMasterEpochHandler {
            requests: Mutex::new(Some(requests)),
            worker: Some(worker),
        }
    }

    fn submit(&self, request: EpochRequest) {
        let requests = self.requests.lock().unwrap();
        match requests.as_ref() {
            // If the worker is gone, the request (and its completion) is dropped, which the caller
            // observes as `HandlerStopped`.
            Some(requests) => {
                let _ = requests.send(request);
            }
            None => (),
        }
    }
}

impl MasterEpochHandler for PersistentMasterEpochHandler {
    fn request_epoch(&self, message: LeaseMessage, on_done: Completion) {
        self.submit(EpochRequest::Request(message, on_done));
    }

    fn store_epoch(&self, message: LeaseMessage, on_done: Completion) {
        self.submit(EpochRequest::Store(message, on_done));
    }
}

impl Drop for PersistentMasterEpochHandler {
    fn drop(&mut self) {
        match self.requests.get_mut() {
            Ok(requests) => drop(requests.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker<K: KVStore>(mut kv_store: K, requests: Receiver<EpochRequest>) {
    let mut epochs: HashMap<CellId, MasterEpoch> = HashMap::new();

    for request in requests.iter() {
        match request {
            EpochRequest::Request(message, on_done) => {
                let outcome = stored_epoch(&kv_store, &mut epochs, &message.cell_id)
                    .map(|epoch| message.with_master_epoch(epoch));
                on_done.complete(outcome);
            }
            EpochRequest::Store(message, on_done) => {
                let outcome = store(&mut kv_store, &mut epochs, &message).map(|()| message);
                if let Err(err) = &outcome {
                    log::warn!("Failed to store master epoch: {}", err);
                }
                on_done.complete(outcome);
            }
        }
    }
}

fn stored_epoch<K: KVStore>(
    kv_store: &K,
    epochs: &mut HashMap<CellId, MasterEpoch>,
    cell_id: &CellId,
) -> Result<MasterEpoch, MasterEpochError> {
    if let Some(epoch) = epochs.get(cell_id) {
        return Ok(*epoch);
    }
    let epoch = kv_store.master_epoch(cell_id)?.unwrap_or_default();
    epochs.insert(cell_id.clone(), epoch);
    Ok(epoch)
}

fn store<K: KVStore>(
    kv_store: &mut K,
    epochs: &mut HashMap<CellId, MasterEpoch>,
    message: &LeaseMessage,
) -> Result<(), MasterEpochError> {
    let cell_id = &message.cell_id;
    let stored = stored_epoch(kv_store, epochs, cell_id)?;
    if message.master_epoch < stored {
        return Err(MasterEpochError::EpochRegression {
            cell: cell_id.clone(),
            stored,
            requested: message.master_epoch,
        });
    }

    let mut wb = StoreWriteBatch::<K::WriteBatch>::new();
    wb.set_master_epoch(cell_id, message.master_epoch)?;
    kv_store
        .write(wb.into_inner())
        .map_err(|source| MasterEpochError::PersistEpoch {
            cell: cell_id.clone(),
            source,
        })?;
    epochs.insert(cell_id.clone(), message.master_epoch);
    log::debug!("Stored master epoch {} for cell {}", message.master_epoch, cell_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{master_epoch::advance_epoch, storage::MemDB};

    #[test]
    fn restarted_handler_continues_from_stored_epoch() {
        let kv_store = MemDB::new();
        let cell = CellId::new("testcell");

        let handler = PersistentMasterEpochHandler::start(kv_store.clone());
        assert_eq!(advance_epoch(&handler, &cell).unwrap(), MasterEpoch::new(1));
        drop(handler);

        let handler = PersistentMasterEpochHandler::start(kv_store);
        assert_eq!(advance_epoch(&handler, &cell).unwrap(), MasterEpoch::new(2));
    }

    #[test]
    fn storage_failure_surfaces_and_keeps_old_epoch() {
        let kv_store = MemDB::new();
        let cell = CellId::new("testcell");
        let handler = PersistentMasterEpochHandler::start(kv_store.clone());
        advance_epoch(&handler, &cell).unwrap();

        kv_store.fail_writes(true);
        assert!(matches!(
            advance_epoch(&handler, &cell),
            Err(MasterEpochError::PersistEpoch { .. })
        ));

        kv_store.fail_writes(false);
        assert_eq!(advance_epoch(&handler, &cell).unwrap(), MasterEpoch::new(2));
    }
}
