/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The protocol envelope exchanged between proposers and acceptors.
//!
//! Every step of the protocol is carried by a single struct, [`LeaseMessage`], whose
//! [`MessageType`] says what the step is. Not every field is meaningful for every type:
//!
//! |Type|`proposal_no`|`holder`/`timeout`|`master_epoch`|
//! |---|---|---|---|
//! |`Prepare`|ballot being prepared|ignored|ignored|
//! |`PrepareAck`|the prepared ballot|previously accepted value (possibly empty)|epoch of that value|
//! |`PrepareNack`|the conflicting (higher) ballot|previously accepted value (possibly empty)|epoch of that value|
//! |`Accept`|ballot being accepted|proposed value|proposer's epoch|
//! |`AcceptAck`|the accepted ballot|the accepted value|the accepted epoch|
//! |`AcceptNack`|the conflicting (higher) ballot|previously accepted value (possibly empty)|epoch of that value|
//! |`Learn`|ballot of the committed value|committed value|committed epoch|
//!
//! Messages are immutable once sent. Proposers build the next step of the protocol with
//! [`LeaseMessage::derive`], which copies every field and changes only the type.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    Address, CellId, LeaseHolder, LeaseValue, MasterEpoch, ProposalNumber, Timestamp,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum MessageType {
    Prepare,
    PrepareAck,
    PrepareNack,
    Accept,
    AcceptAck,
    AcceptNack,
    Learn,
    /// Local notification that the proposing side restarted. Not served by acceptors.
    EventRestart,
    /// Local notification that a protocol timer fired. Not served by acceptors.
    EventTimeout,
}

impl MessageType {
    pub fn is_nack(&self) -> bool {
        matches!(self, MessageType::PrepareNack | MessageType::AcceptNack)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, MessageType::PrepareAck | MessageType::AcceptAck)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LeaseMessage {
    pub msg_type: MessageType,
    pub cell_id: CellId,
    pub proposal_no: ProposalNumber,
    pub holder: LeaseHolder,
    pub timeout: Timestamp,
    pub master_epoch: MasterEpoch,
    pub send_timestamp: Timestamp,
    /// Address of the peer that sent this message. `None` until the message is stamped by a sender.
    pub sender: Option<Address>,
}

impl LeaseMessage {
    /// Create a message of the given type for `cell_id`, with every other field empty.
    pub fn new(msg_type: MessageType, cell_id: CellId) -> LeaseMessage {
        LeaseMessage {
            msg_type,
            cell_id,
            proposal_no: ProposalNumber::EMPTY,
            holder: LeaseHolder::default(),
            timeout: Timestamp::ZERO,
            master_epoch: MasterEpoch::ZERO,
            send_timestamp: Timestamp::ZERO,
            sender: None,
        }
    }

    /// Copy every field of `other`, replacing only the message type.
    pub fn derive(msg_type: MessageType, other: &LeaseMessage) -> LeaseMessage {
        LeaseMessage {
            msg_type,
            ..other.clone()
        }
    }

    pub fn with_proposal_no(mut self, proposal_no: ProposalNumber) -> Self {
        self.proposal_no = proposal_no;
        self
    }

    pub fn with_value(mut self, value: LeaseValue) -> Self {
        self.holder = value.holder;
        self.timeout = value.timeout;
        self
    }

    pub fn with_master_epoch(mut self, master_epoch: MasterEpoch) -> Self {
        self.master_epoch = master_epoch;
        self
    }

    /// Set the sender and the send timestamp, as done just before the message leaves its sender.
    pub fn stamped(mut self, sender: Address, send_timestamp: Timestamp) -> Self {
        self.sender = Some(sender);
        self.send_timestamp = send_timestamp;
        self
    }

    pub fn is_nack(&self) -> bool {
        self.msg_type.is_nack()
    }

    pub fn is_ack(&self) -> bool {
        self.msg_type.is_ack()
    }

    /// The lease value (holder and timeout) carried by this message.
    pub fn value(&self) -> LeaseValue {
        LeaseValue {
            holder: self.holder.clone(),
            timeout: self.timeout,
        }
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        self.try_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> std::io::Result<LeaseMessage> {
        LeaseMessage::try_from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_keeps_every_field_but_the_type() {
        let prepare = LeaseMessage::new(MessageType::Prepare, CellId::new("cell"))
            .with_proposal_no(ProposalNumber::new(4, 2))
            .with_value(LeaseValue::new("me", Timestamp::from_millis(1_000)))
            .with_master_epoch(MasterEpoch::new(3))
            .stamped(Address::localhost(4000), Timestamp::from_millis(900));

        let accept = LeaseMessage::derive(MessageType::Accept, &prepare);
        assert_eq!(accept.msg_type, MessageType::Accept);
        assert_eq!(
            LeaseMessage::derive(MessageType::Prepare, &accept),
            prepare
        );
    }

    #[test]
    fn encoded_message_decodes_with_all_fields_intact() {
        let msg = LeaseMessage::new(MessageType::AcceptNack, CellId::new("x"))
            .with_proposal_no(ProposalNumber::new(9, 1))
            .with_value(LeaseValue::new("holder", Timestamp::from_millis(77)))
            .stamped(Address::localhost(1), Timestamp::from_millis(5));

        let decoded = LeaseMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_nack());
        assert!(!decoded.is_ack());
    }

    #[test]
    fn truncated_bytes_do_not_decode() {
        let bytes = LeaseMessage::new(MessageType::Learn, CellId::new("x"))
            .encode()
            .unwrap();
        assert!(LeaseMessage::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
