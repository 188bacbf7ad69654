/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! One-shot completion signal for asynchronous master epoch operations.

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

use crate::messages::LeaseMessage;

use super::MasterEpochError;

pub type EpochOutcome = Result<LeaseMessage, MasterEpochError>;

/// The sending half of the signal, handed to a [`MasterEpochHandler`](super::MasterEpochHandler)
/// operation and consumed when the operation finishes.
///
/// Dropping a `Completion` without completing it makes the receiver report
/// [`MasterEpochError::HandlerStopped`].
pub struct Completion(Sender<EpochOutcome>);

/// The receiving half of the signal, kept by the caller.
pub struct CompletionReceiver(Receiver<EpochOutcome>);

impl Completion {
    pub fn new() -> (Completion, CompletionReceiver) {
        let (sender, receiver) = mpsc::channel();
        (Completion(sender), CompletionReceiver(receiver))
    }

    /// Signal that the operation is done. For `store_epoch`, this must only be called once the epoch
    /// is durable.
    pub fn complete(self, outcome: EpochOutcome) {
        // The caller may have given up waiting.
        let _ = self.0.send(outcome);
    }
}

impl CompletionReceiver {
    /// Block until the operation completes.
    pub fn wait(self) -> EpochOutcome {
        self.0.recv().unwrap_or(Err(MasterEpochError::HandlerStopped))
    }

    /// Block until the operation completes or `timeout` passes.
    pub fn wait_timeout(self, timeout: Duration) -> EpochOutcome {
        match self.0.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(MasterEpochError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(MasterEpochError::HandlerStopped),
        }
    }

    /// The outcome, if the operation already completed.
    pub fn try_get(&self) -> Option<EpochOutcome> {
        match self.0.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(MasterEpochError::HandlerStopped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::MessageType,
        types::{CellId, MasterEpoch},
    };

    #[test]
    fn pending_then_completed() {
        let (on_done, done) = Completion::new();
        assert!(done.try_get().is_none());

        on_done.complete(Ok(LeaseMessage::new(
            MessageType::EventRestart,
            CellId::new("cell"),
        )
        .with_master_epoch(MasterEpoch::new(3))));
        let outcome = done.try_get().unwrap().unwrap();
        assert_eq!(outcome.master_epoch, MasterEpoch::new(3));
    }

    #[test]
    fn dropped_completion_means_handler_stopped() {
        let (on_done, done) = Completion::new();
        drop(on_done);
        assert!(matches!(done.wait(), Err(MasterEpochError::HandlerStopped)));

        let (_on_done, done) = Completion::new();
        assert!(matches!(
            done.wait_timeout(Duration::from_millis(10)),
            Err(MasterEpochError::Timeout)
        ));
    }
}
