//! Builders for the messages a proposer sends to acceptors.

use std::time::Duration;

use flease_rs::{
    messages::{LeaseMessage, MessageType},
    types::{Address, CellId, LeaseValue, MasterEpoch, ProposalNumber, Timestamp},
};

pub(crate) fn prepare(cell: &str, proposal_no: ProposalNumber, from: &Address) -> LeaseMessage {
    LeaseMessage::new(MessageType::Prepare, CellId::new(cell))
        .with_proposal_no(proposal_no)
        .stamped(from.clone(), Timestamp::now())
}

pub(crate) fn accept(
    cell: &str,
    proposal_no: ProposalNumber,
    holder: &str,
    epoch: MasterEpoch,
    from: &Address,
) -> LeaseMessage {
    LeaseMessage::new(MessageType::Accept, CellId::new(cell))
        .with_proposal_no(proposal_no)
        .with_value(lease_for(holder))
        .with_master_epoch(epoch)
        .stamped(from.clone(), Timestamp::now())
}

pub(crate) fn learn(
    cell: &str,
    proposal_no: ProposalNumber,
    holder: &str,
    epoch: MasterEpoch,
    from: &Address,
) -> LeaseMessage {
    LeaseMessage::derive(MessageType::Learn, &accept(cell, proposal_no, holder, epoch, from))
}

// A lease that stays valid for the whole test.
pub(crate) fn lease_for(holder: &str) -> LeaseValue {
    LeaseValue::new(holder, Timestamp::now().saturating_add(Duration::from_secs(60)))
}
