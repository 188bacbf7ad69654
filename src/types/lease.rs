/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Lease values as voted on by acceptors, and learned leases as reported to observers.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{CellId, LeaseHolder, MasterEpoch, ProposalNumber, Timestamp};

/// The value acceptors vote on: who holds the lease, and until when.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LeaseValue {
    pub holder: LeaseHolder,
    pub timeout: Timestamp,
}

impl LeaseValue {
    pub fn new(holder: impl Into<LeaseHolder>, timeout: Timestamp) -> Self {
        Self {
            holder: holder.into(),
            timeout,
        }
    }

    /// Whether this is the "no value" placeholder (no holder).
    pub fn is_empty(&self) -> bool {
        self.holder.is_empty()
    }
}

/// A committed lease, as known locally to an acceptor after a successful LEARN.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LearnedLease {
    pub cell_id: CellId,
    pub holder: LeaseHolder,
    pub timeout: Timestamp,
    pub master_epoch: MasterEpoch,
    pub proposal_no: ProposalNumber,
}

impl LearnedLease {
    /// Whether the lease has not yet timed out at `now`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now.is_before(self.timeout)
    }
}
