/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events an acceptor emits.
//!
//! Each event indicates that the corresponding action has been completed, including persisting the
//! resulting state. Handlers for these events are registered through the
//! [`AcceptorSpec`](crate::acceptor::AcceptorSpec) builder and are invoked on the thread that processed
//! the message, before the reply (if any) is handed back to the caller.
//!
//! When `log_events` is enabled in the [`AcceptorConfiguration`](crate::acceptor::AcceptorConfiguration),
//! every event is additionally printed as a CSV line by the default handlers in
//! [`logging`](crate::logging).

use std::time::SystemTime;

use crate::{
    messages::MessageType,
    types::{CellId, LeaseHolder, LearnedLease, MasterEpoch, ProposalNumber, Timestamp},
};

pub enum Event {
    Promise(PromiseEvent),
    Accept(AcceptEvent),
    Reject(RejectEvent),
    Learn(LearnEvent),
}

/// The acceptor promised not to accept ballots lower than `proposal_no` for `cell_id`.
pub struct PromiseEvent {
    pub timestamp: SystemTime,
    pub cell_id: CellId,
    pub proposal_no: ProposalNumber,
}

/// The acceptor accepted a lease value under `proposal_no`.
pub struct AcceptEvent {
    pub timestamp: SystemTime,
    pub cell_id: CellId,
    pub proposal_no: ProposalNumber,
    pub holder: LeaseHolder,
    pub lease_timeout: Timestamp,
    pub master_epoch: MasterEpoch,
}

/// The acceptor answered a PREPARE or ACCEPT with a NACK because it had already seen `conflicting`.
pub struct RejectEvent {
    pub timestamp: SystemTime,
    pub cell_id: CellId,
    pub rejected: MessageType,
    pub proposal_no: ProposalNumber,
    pub conflicting: ProposalNumber,
}

/// The acceptor learned (committed) a lease for a cell. This is the learn notification observers of
/// lease ownership listen to.
pub struct LearnEvent {
    pub timestamp: SystemTime,
    pub cell_id: CellId,
    pub holder: LeaseHolder,
    pub lease_timeout: Timestamp,
    pub master_epoch: MasterEpoch,
    pub proposal_no: ProposalNumber,
}

impl LearnEvent {
    pub fn lease(&self) -> LearnedLease {
        LearnedLease {
            cell_id: self.cell_id.clone(),
            holder: self.holder.clone(),
            timeout: self.lease_timeout,
            master_epoch: self.master_epoch,
            proposal_no: self.proposal_no,
        }
    }
}
