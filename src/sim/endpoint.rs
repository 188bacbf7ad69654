/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The receive side of a simulated peer.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
};

use crate::messages::LeaseMessage;

/// Something the [`Communicator`](super::Communicator) can deliver messages to.
///
/// `receive_message` is called on the communicator's consumer thread and must not block on other
/// simulated peers.
pub trait Endpoint: Send + Sync {
    fn receive_message(&self, message: LeaseMessage) -> Result<(), EndpointError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The endpoint no longer accepts messages. The communicator drops the message silently.
    ShuttingDown,
}

impl Display for EndpointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::ShuttingDown => write!(f, "endpoint is shutting down"),
        }
    }
}

impl Error for EndpointError {}

/// An endpoint that forwards every message into a channel.
///
/// Reports [`EndpointError::ShuttingDown`] once the receiving half of the channel is dropped.
pub struct ChannelEndpoint(Mutex<Sender<LeaseMessage>>);

impl ChannelEndpoint {
    pub fn new() -> (ChannelEndpoint, Receiver<LeaseMessage>) {
        let (sender, receiver) = mpsc::channel();
        (ChannelEndpoint(Mutex::new(sender)), receiver)
    }
}

impl Endpoint for ChannelEndpoint {
    fn receive_message(&self, message: LeaseMessage) -> Result<(), EndpointError> {
        self.0
            .lock()
            .unwrap()
            .send(message)
            .map_err(|_| EndpointError::ShuttingDown)
    }
}
