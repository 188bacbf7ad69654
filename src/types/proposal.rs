/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Totally ordered ballot identifiers.
//!
//! A [`ProposalNumber`] is a pair of a ballot counter and the identity of the proposer that issued it.
//! Proposal numbers are ordered by counter first, with the proposer identity breaking ties. Since each
//! proposer only ever issues a given counter once, two distinct proposals never compare equal, and
//! every acceptor decision (prepare, accept, learn) is a plain comparison of proposal numbers.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

/// Identity of a proposer, used to break ties between proposals with the same counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct ProposerId(u64);

impl ProposerId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ProposerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Ballot number of a proposal.
///
/// The derived ordering compares `counter` first and `proposer` second, which is exactly the
/// precedence the protocol needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct ProposalNumber {
    pub counter: u64,
    pub proposer: ProposerId,
}

impl ProposalNumber {
    /// The ballot that precedes every proposal a proposer can issue. Acceptors use it to mean "nothing
    /// prepared or accepted yet".
    pub const EMPTY: ProposalNumber = ProposalNumber {
        counter: 0,
        proposer: ProposerId(0),
    };

    pub const fn new(counter: u64, proposer: u64) -> Self {
        Self {
            counter,
            proposer: ProposerId(proposer),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// The smallest proposal number issued by `proposer` that is strictly greater than `self`, or
    /// `None` if no such proposal number exists.
    ///
    /// Proposers call this with the ballot carried by a NACK to retry with a ballot that beats the
    /// conflicting one.
    pub fn next_for(&self, proposer: ProposerId) -> Option<ProposalNumber> {
        let candidate = ProposalNumber {
            counter: self.counter,
            proposer,
        };
        if candidate > *self {
            return Some(candidate);
        }
        self.counter
            .checked_add(1)
            .map(|counter| ProposalNumber { counter, proposer })
    }
}

impl Display for ProposalNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.counter, self.proposer)
    }
}
