/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A threaded front-end to the acceptor that serializes each cell on a worker thread of its own.
//!
//! The first message for a cell spawns the cell's worker, which owns an [`Acceptor`] whose cache only
//! ever holds that cell. Every later message for the cell is funneled through the same worker's
//! channel, so messages of one cell are processed one at a time and in submission order, while
//! messages of different cells proceed in parallel.
//!
//! Dropping the stage closes every worker's channel and joins the workers after they have processed
//! what was already submitted.

use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::{
    event_handlers::EventHandlers,
    messages::LeaseMessage,
    storage::KVStore,
    types::{CellId, LearnedLease},
};

use super::{implementation::Acceptor, spec::AcceptorConfiguration, AcceptorError};

pub type AcceptorReply = Result<Option<LeaseMessage>, AcceptorError>;

enum Request {
    Message {
        msg: LeaseMessage,
        reply_to: Sender<AcceptorReply>,
    },
    LeaseInformation {
        reply_to: Sender<Result<Option<LearnedLease>, AcceptorError>>,
    },
}

struct Worker {
    requests: Sender<Request>,
    thread: JoinHandle<()>,
}

struct StageInner<K: KVStore> {
    kv_store: K,
    workers: HashMap<CellId, Worker>,
}

/// A handle to the per-cell worker threads of an acceptor. When this value is dropped, all worker
/// threads are gracefully shut down.
pub struct AcceptorStage<K: KVStore> {
    inner: Mutex<StageInner<K>>,
    configuration: AcceptorConfiguration,
    handlers: Arc<EventHandlers>,
}

impl<K: KVStore> AcceptorStage<K> {
    pub(crate) fn new(
        kv_store: K,
        configuration: AcceptorConfiguration,
        handlers: Arc<EventHandlers>,
    ) -> AcceptorStage<K> {
        AcceptorStage {
            inner: Mutex::new(StageInner {
                kv_store,
                workers: HashMap::new(),
            }),
            configuration,
            handlers,
        }
    }

    /// Submit a message and get a receiver for its outcome.
    pub fn submit(&self, msg: LeaseMessage) -> Receiver<AcceptorReply> {
        let (reply_to, reply) = mpsc::channel();
        self.submit_with(msg, reply_to);
        reply
    }

    /// Submit a message, sending its outcome to `reply_to`. Used to collect the outcomes of many
    /// messages on a single channel.
    pub fn submit_with(&self, msg: LeaseMessage, reply_to: Sender<AcceptorReply>) {
        let cell_id = msg.cell_id.clone();
        self.dispatch(&cell_id, Request::Message { msg, reply_to });
    }

    /// Get the lease learned for `cell_id`, as known by this acceptor.
    pub fn get_local_lease_information(
        &self,
        cell_id: &CellId,
    ) -> Result<Option<LearnedLease>, AcceptorError> {
        let (reply_to, reply) = mpsc::channel();
        self.dispatch(cell_id, Request::LeaseInformation { reply_to });
        reply.recv().unwrap_or_else(|_| {
            Err(AcceptorError::WorkerStopped {
                cell: cell_id.clone(),
            })
        })
    }

    /// Number of cells this stage has spawned a worker for.
    pub fn num_cells(&self) -> usize {
        self.inner.lock().unwrap().workers.len()
    }

    fn dispatch(&self, cell_id: &CellId, request: Request) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.workers.contains_key(cell_id) {
            let worker = self.spawn_worker(cell_id, inner.kv_store.clone());
            inner.workers.insert(cell_id.clone(), worker);
        }
        if let Some(worker) = inner.workers.get(cell_id) {
            if worker.requests.send(request).is_err() {
                log::warn!("Acceptor worker for cell {} is gone", cell_id);
            }
        }
    }

    fn spawn_worker(&self, cell_id: &CellId, kv_store: K) -> Worker {
        let (requests, request_receiver) = mpsc::channel::<Request>();
        let mut acceptor = Acceptor::new(
            kv_store,
            self.configuration.me.clone(),
            self.configuration.message_timeout,
            self.handlers.clone(),
        );
        log::debug!("Spawning acceptor worker for cell {}", cell_id);

        let cell_id = cell_id.clone();
        let thread = thread::spawn(move || {
            for request in request_receiver.iter() {
                match request {
                    Request::Message { msg, reply_to } => {
                        let outcome = acceptor.process_message(&msg);
                        if let Err(err) = &outcome {
                            log::warn!("Acceptor failed to process {:?}: {}", msg.msg_type, err);
                        }
                        let _ = reply_to.send(outcome);
                    }
                    Request::LeaseInformation { reply_to } => {
                        let _ = reply_to.send(acceptor.get_local_lease_information(&cell_id));
                    }
                }
            }
        });

        Worker { requests, thread }
    }
}

impl<K: KVStore> Drop for AcceptorStage<K> {
    fn drop(&mut self) {
        let workers = match self.inner.get_mut() {
            Ok(inner) => std::mem::take(&mut inner.workers),
            Err(poisoned) => std::mem::take(&mut poisoned.into_inner().workers),
        };
        for (_, worker) in workers {
            drop(worker.requests);
            let _ = worker.thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        acceptor::AcceptorSpec,
        messages::MessageType,
        storage::MemDB,
        types::{Address, LeaseValue, ProposalNumber, Timestamp},
    };

    fn learn(cell: &str, holder: &str) -> LeaseMessage {
        LeaseMessage::new(MessageType::Learn, CellId::new(cell))
            .with_proposal_no(ProposalNumber::new(1, 1))
            .with_value(LeaseValue::new(
                holder,
                Timestamp::now().saturating_add(Duration::from_secs(60)),
            ))
    }

    #[test]
    fn stopped_worker_is_reported_instead_of_an_empty_lease() {
        let stage = AcceptorSpec::builder()
            .kv_store(MemDB::new())
            .configuration(
                AcceptorConfiguration::builder()
                    .me(Address::localhost(1))
                    .build(),
            )
            .on_learn(|event| {
                if event.holder.as_str() == "crash" {
                    panic!("handler failure");
                }
            })
            .build()
            .start();

        // The worker of "a" dies while processing this message.
        assert!(stage.submit(learn("a", "crash")).recv().is_err());
        assert!(matches!(
            stage.get_local_lease_information(&CellId::new("a")),
            Err(AcceptorError::WorkerStopped { .. })
        ));

        // Other cells are unaffected.
        stage.submit(learn("b", "fine")).recv().unwrap().unwrap();
        let lease = stage
            .get_local_lease_information(&CellId::new("b"))
            .unwrap()
            .unwrap();
        assert_eq!(lease.holder.as_str(), "fine");
    }
}
