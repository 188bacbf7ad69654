/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The durable per-cell state of an acceptor.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{LeaseValue, MasterEpoch, ProposalNumber};

/// A lease value together with the ballot it was accepted (or learned) under and the master epoch
/// of the proposer that issued it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AcceptedValue {
    pub proposal_no: ProposalNumber,
    pub value: LeaseValue,
    pub master_epoch: MasterEpoch,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AcceptorCellState {
    /// Highest ballot this acceptor has answered a PREPARE or ACCEPT for.
    pub prepared: ProposalNumber,
    pub accepted: Option<AcceptedValue>,
    pub learned: Option<AcceptedValue>,
}

impl AcceptorCellState {
    pub fn accepted_proposal_no(&self) -> ProposalNumber {
        self.accepted
            .as_ref()
            .map(|accepted| accepted.proposal_no)
            .unwrap_or(ProposalNumber::EMPTY)
    }

    /// The highest ballot this acceptor is bound by: no PREPARE or ACCEPT below it may be
    /// acknowledged.
    pub fn promised(&self) -> ProposalNumber {
        self.prepared.max(self.accepted_proposal_no())
    }

    /// Whether a PREPARE or ACCEPT at `proposal_no` may be acknowledged.
    pub fn admits(&self, proposal_no: ProposalNumber) -> bool {
        proposal_no >= self.prepared && proposal_no >= self.accepted_proposal_no()
    }

    /// Whether a LEARN at `proposal_no` may be recorded: it must not lie below the accepted ballot,
    /// and it must be strictly newer than whatever was already learned.
    pub fn learnable(&self, proposal_no: ProposalNumber) -> bool {
        proposal_no >= self.accepted_proposal_no()
            && self
                .learned
                .as_ref()
                .map_or(true, |learned| proposal_no > learned.proposal_no)
    }

    /// The accepted value and its epoch, or the empty value and epoch zero if nothing was accepted.
    pub(crate) fn accepted_value_and_epoch(&self) -> (LeaseValue, MasterEpoch) {
        match &self.accepted {
            Some(accepted) => (accepted.value.clone(), accepted.master_epoch),
            None => (LeaseValue::default(), MasterEpoch::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn accepted_at(counter: u64) -> AcceptedValue {
        AcceptedValue {
            proposal_no: ProposalNumber::new(counter, 1),
            value: LeaseValue::new("a", Timestamp::from_millis(10)),
            master_epoch: MasterEpoch::new(1),
        }
    }

    #[test]
    fn fresh_cell_admits_any_ballot() {
        let state = AcceptorCellState::default();
        assert!(state.admits(ProposalNumber::EMPTY));
        assert!(state.admits(ProposalNumber::new(1, 1)));
        assert_eq!(state.promised(), ProposalNumber::EMPTY);
    }

    #[test]
    fn promised_is_the_max_of_prepared_and_accepted() {
        let state = AcceptorCellState {
            prepared: ProposalNumber::new(2, 1),
            accepted: Some(accepted_at(5)),
            learned: None,
        };
        assert_eq!(state.promised(), ProposalNumber::new(5, 1));
        assert!(!state.admits(ProposalNumber::new(4, 9)));
        assert!(state.admits(ProposalNumber::new(5, 1)));
    }

    #[test]
    fn learn_must_be_strictly_newer_than_learned() {
        let state = AcceptorCellState {
            prepared: ProposalNumber::new(3, 1),
            accepted: Some(accepted_at(3)),
            learned: Some(accepted_at(3)),
        };
        assert!(!state.learnable(ProposalNumber::new(3, 1)));
        assert!(!state.learnable(ProposalNumber::new(2, 1)));
        assert!(state.learnable(ProposalNumber::new(4, 1)));
    }
}
