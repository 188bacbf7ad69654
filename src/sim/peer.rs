/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An acceptor attached to a simulated network.
//!
//! The acceptor listens on the port of its configured address. Every message delivered to that port
//! is submitted to an [`AcceptorStage`], and every reply the stage produces is sent back, through the
//! same communicator, to the port of the message's sender. Messages without a sender are processed
//! but never answered.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::{
    acceptor::{AcceptorError, AcceptorReply, AcceptorSpec, AcceptorStage},
    messages::LeaseMessage,
    storage::KVStore,
    types::{CellId, LearnedLease, Port},
};

use super::{CommunicatorHandle, Endpoint, EndpointError, SimulatorError};

type PendingReply = (Option<Port>, Receiver<AcceptorReply>);

struct AcceptorEndpoint<K: KVStore> {
    stage: AcceptorStage<K>,
    shutting_down: AtomicBool,
    pending_replies: Mutex<Option<Sender<PendingReply>>>,
}

impl<K: KVStore> Endpoint for AcceptorEndpoint<K> {
    fn receive_message(&self, message: LeaseMessage) -> Result<(), EndpointError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EndpointError::ShuttingDown);
        }
        let pending_replies = self.pending_replies.lock().unwrap();
        let pending_replies = pending_replies
            .as_ref()
            .ok_or(EndpointError::ShuttingDown)?;

        let reply_port = message.sender.as_ref().map(|address| address.port);
        let reply = self.stage.submit(message);
        pending_replies
            .send((reply_port, reply))
            .map_err(|_| EndpointError::ShuttingDown)
    }
}

/// A handle to an acceptor serving a port of a simulated network. When this value is dropped, the port
/// is closed and the acceptor's threads are shut down.
pub struct SimulatedAcceptor<K: KVStore> {
    port: Port,
    endpoint: Arc<AcceptorEndpoint<K>>,
    communicator: CommunicatorHandle,
    forwarder: Option<JoinHandle<()>>,
}

impl<K: KVStore> SimulatedAcceptor<K> {
    /// Start the acceptor described by `spec` and open the port of its address on `communicator`.
    pub fn start(
        spec: AcceptorSpec<K>,
        communicator: CommunicatorHandle,
    ) -> Result<SimulatedAcceptor<K>, SimulatorError> {
        let port = spec.me().port;
        let (pending_replies, pending_reply_receiver) = mpsc::channel();
        let endpoint = Arc::new(AcceptorEndpoint {
            stage: spec.start(),
            shutting_down: AtomicBool::new(false),
            pending_replies: Mutex::new(Some(pending_replies)),
        });
        communicator.open_port(port, endpoint.clone())?;

        let forwarder = start_forwarder(pending_reply_receiver, communicator.clone());

        Ok(SimulatedAcceptor {
            port,
            endpoint,
            communicator,
            forwarder: Some(forwarder),
        })
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn get_local_lease_information(
        &self,
        cell_id: &CellId,
    ) -> Result<Option<LearnedLease>, AcceptorError> {
        self.endpoint.stage.get_local_lease_information(cell_id)
    }
}

impl<K: KVStore> Drop for SimulatedAcceptor<K> {
    fn drop(&mut self) {
        self.communicator.close_port(self.port);
        self.endpoint.shutting_down.store(true, Ordering::Release);
        match self.endpoint.pending_replies.lock() {
            Ok(mut pending_replies) => drop(pending_replies.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.join();
        }
    }
}

// Replies are forwarded in the order the messages were delivered.
fn start_forwarder(
    pending_replies: Receiver<PendingReply>,
    communicator: CommunicatorHandle,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for (reply_port, reply) in pending_replies.iter() {
            match (reply.recv(), reply_port) {
                (Ok(Ok(Some(reply))), Some(port)) => communicator.send(port, reply),
                (Ok(Ok(_)), _) => (),
                (Ok(Err(err)), _) => log::warn!("Acceptor did not reply: {}", err),
                (Err(_), _) => return,
            }
        }
    })
}
