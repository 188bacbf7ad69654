/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The acceptor state machine.
//!
//! ## Protocol
//!
//! For a message with ballot `p` on a cell whose state is `s`:
//!
//! ```text
//! PREPARE(p):
//!   if p >= s.prepared and p >= s.accepted.proposal_no:
//!     s.prepared = p, persist
//!     reply PREPARE_ACK(p, s.accepted.value, s.accepted.master_epoch)
//!   else:
//!     reply PREPARE_NACK(s.promised, s.accepted.value, s.accepted.master_epoch)
//!
//! ACCEPT(p, v, e):
//!   if p >= s.prepared and p >= s.accepted.proposal_no:
//!     s.prepared = p, s.accepted = (p, v, e), persist
//!     reply ACCEPT_ACK(p, v, e)
//!   else:
//!     reply ACCEPT_NACK(s.promised, s.accepted.value, s.accepted.master_epoch)
//!
//! LEARN(p, v, e):
//!   if p >= s.accepted.proposal_no and p > s.learned.proposal_no:
//!     s.learned = (p, v, e), and s.accepted = (p, v, e) if p is higher, persist
//!     notify on_learn(cell, v.holder, v.timeout, e)
//!   no reply
//! ```
//!
//! A state change is committed to the [`KVStore`] before the reply or the learn notification is
//! produced. If the store fails, the cached state is left untouched and the failure is returned to the
//! caller instead of a reply.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use crate::{
    event_handlers::EventHandlers,
    events::*,
    messages::{LeaseMessage, MessageType},
    storage::{KVStore, StoreWriteBatch},
    types::{Address, CellId, LearnedLease, Timestamp},
};

use super::{
    cell_state::{AcceptedValue, AcceptorCellState},
    AcceptorError,
};

pub struct Acceptor<K: KVStore> {
    kv_store: K,
    me: Address,
    message_timeout: Option<Duration>,
    cells: HashMap<CellId, AcceptorCellState>,
    handlers: Arc<EventHandlers>,
}

impl<K: KVStore> Acceptor<K> {
    pub(crate) fn new(
        kv_store: K,
        me: Address,
        message_timeout: Option<Duration>,
        handlers: Arc<EventHandlers>,
    ) -> Acceptor<K> {
        Acceptor {
            kv_store,
            me,
            message_timeout,
            cells: HashMap::new(),
            handlers,
        }
    }

    /// The address replies are stamped with.
    pub fn me(&self) -> &Address {
        &self.me
    }

    /// Process one incoming message and return the reply to send back to its sender, if any.
    ///
    /// Messages for the same cell must not be processed concurrently. Conflicting ballots are answered
    /// with a NACK; an `Err` is returned only when the cell state could not be read or persisted.
    pub fn process_message(
        &mut self,
        msg: &LeaseMessage,
    ) -> Result<Option<LeaseMessage>, AcceptorError> {
        match msg.msg_type {
            MessageType::Prepare | MessageType::Accept | MessageType::Learn => (),
            other => {
                log::debug!("Acceptor {} ignoring {:?} for cell {}", self.me, other, msg.cell_id);
                return Ok(None);
            }
        }

        if self.is_expired(msg, Timestamp::now()) {
            log::debug!(
                "Acceptor {} dropping expired {:?} for cell {} sent at {}",
                self.me,
                msg.msg_type,
                msg.cell_id,
                msg.send_timestamp
            );
            return Ok(None);
        }

        match msg.msg_type {
            MessageType::Prepare => self.on_prepare(msg).map(Some),
            MessageType::Accept => self.on_accept(msg).map(Some),
            MessageType::Learn => self.on_learn(msg).map(|()| None),
            _ => Ok(None),
        }
    }

    /// The lease learned for `cell_id`, or `None` if no LEARN has been recorded for it.
    ///
    /// A value that was only prepared or accepted is never returned here.
    pub fn get_local_lease_information(
        &mut self,
        cell_id: &CellId,
    ) -> Result<Option<LearnedLease>, AcceptorError> {
        let state = self.cell_state(cell_id)?;
        Ok(state.learned.as_ref().map(|learned| LearnedLease {
            cell_id: cell_id.clone(),
            holder: learned.value.holder.clone(),
            timeout: learned.value.timeout,
            master_epoch: learned.master_epoch,
            proposal_no: learned.proposal_no,
        }))
    }

    fn on_prepare(&mut self, msg: &LeaseMessage) -> Result<LeaseMessage, AcceptorError> {
        let state = self.cell_state(&msg.cell_id)?;
        let (accepted_value, accepted_epoch) = state.accepted_value_and_epoch();

        if !state.admits(msg.proposal_no) {
            let conflicting = state.promised();
            log::debug!(
                "Acceptor {} NACKs PREPARE {} for cell {}, promised {}",
                self.me,
                msg.proposal_no,
                msg.cell_id,
                conflicting
            );
            self.fire(|| {
                Event::Reject(RejectEvent {
                    timestamp: SystemTime::now(),
                    cell_id: msg.cell_id.clone(),
                    rejected: MessageType::Prepare,
                    proposal_no: msg.proposal_no,
                    conflicting,
                })
            });
            return Ok(self.reply(MessageType::PrepareNack, msg)
                .with_proposal_no(conflicting)
                .with_value(accepted_value)
                .with_master_epoch(accepted_epoch));
        }

        if msg.proposal_no > state.prepared {
            let mut new_state = state;
            new_state.prepared = msg.proposal_no;
            self.persist(&msg.cell_id, new_state)?;
        }

        self.fire(|| {
            Event::Promise(PromiseEvent {
                timestamp: SystemTime::now(),
                cell_id: msg.cell_id.clone(),
                proposal_no: msg.proposal_no,
            })
        });
        Ok(self.reply(MessageType::PrepareAck, msg)
            .with_value(accepted_value)
            .with_master_epoch(accepted_epoch))
    }

    fn on_accept(&mut self, msg: &LeaseMessage) -> Result<LeaseMessage, AcceptorError> {
        let state = self.cell_state(&msg.cell_id)?;

        if !state.admits(msg.proposal_no) {
            let conflicting = state.promised();
            let (accepted_value, accepted_epoch) = state.accepted_value_and_epoch();
            log::debug!(
                "Acceptor {} NACKs ACCEPT {} for cell {}, promised {}",
                self.me,
                msg.proposal_no,
                msg.cell_id,
                conflicting
            );
            self.fire(|| {
                Event::Reject(RejectEvent {
                    timestamp: SystemTime::now(),
                    cell_id: msg.cell_id.clone(),
                    rejected: MessageType::Accept,
                    proposal_no: msg.proposal_no,
                    conflicting,
                })
            });
            return Ok(self.reply(MessageType::AcceptNack, msg)
                .with_proposal_no(conflicting)
                .with_value(accepted_value)
                .with_master_epoch(accepted_epoch));
        }

        let mut new_state = state;
        new_state.prepared = msg.proposal_no;
        new_state.accepted = Some(AcceptedValue {
            proposal_no: msg.proposal_no,
            value: msg.value(),
            master_epoch: msg.master_epoch,
        });
        self.persist(&msg.cell_id, new_state)?;

        self.fire(|| {
            Event::Accept(AcceptEvent {
                timestamp: SystemTime::now(),
                cell_id: msg.cell_id.clone(),
                proposal_no: msg.proposal_no,
                holder: msg.holder.clone(),
                lease_timeout: msg.timeout,
                master_epoch: msg.master_epoch,
            })
        });
        Ok(self.reply(MessageType::AcceptAck, msg))
    }

    fn on_learn(&mut self, msg: &LeaseMessage) -> Result<(), AcceptorError> {
        let state = self.cell_state(&msg.cell_id)?;

        if !state.learnable(msg.proposal_no) {
            log::debug!(
                "Acceptor {} ignoring stale LEARN {} for cell {}",
                self.me,
                msg.proposal_no,
                msg.cell_id
            );
            return Ok(());
        }

        let learned = AcceptedValue {
            proposal_no: msg.proposal_no,
            value: msg.value(),
            master_epoch: msg.master_epoch,
        };
        let mut new_state = state;
        if msg.proposal_no > new_state.accepted_proposal_no() {
            new_state.accepted = Some(learned.clone());
        }
        new_state.learned = Some(learned);
        self.persist(&msg.cell_id, new_state)?;

        log::debug!(
            "Acceptor {} learned lease for cell {}: holder {} until {}",
            self.me,
            msg.cell_id,
            msg.holder,
            msg.timeout
        );
        self.fire(|| {
            Event::Learn(LearnEvent {
                timestamp: SystemTime::now(),
                cell_id: msg.cell_id.clone(),
                holder: msg.holder.clone(),
                lease_timeout: msg.timeout,
                master_epoch: msg.master_epoch,
                proposal_no: msg.proposal_no,
            })
        });
        Ok(())
    }

    /// Get a copy of the state of a cell, loading it from the store on first use.
    fn cell_state(&mut self, cell_id: &CellId) -> Result<AcceptorCellState, AcceptorError> {
        if let Some(state) = self.cells.get(cell_id) {
            return Ok(state.clone());
        }
        let state = self.kv_store.acceptor_cell(cell_id)?.unwrap_or_default();
        self.cells.insert(cell_id.clone(), state.clone());
        Ok(state)
    }

    /// Durably write `state`, and only then make it the cached state of the cell.
    fn persist(&mut self, cell_id: &CellId, state: AcceptorCellState) -> Result<(), AcceptorError> {
        let mut wb = StoreWriteBatch::<K::WriteBatch>::new();
        wb.set_acceptor_cell(cell_id, &state)?;
        self.kv_store
            .write(wb.into_inner())
            .map_err(|source| AcceptorError::PersistCellState {
                cell: cell_id.clone(),
                source,
            })?;
        self.cells.insert(cell_id.clone(), state);
        Ok(())
    }

    fn reply(&self, msg_type: MessageType, request: &LeaseMessage) -> LeaseMessage {
        LeaseMessage::derive(msg_type, request).stamped(self.me.clone(), Timestamp::now())
    }

    /// Unstamped messages never expire.
    fn is_expired(&self, msg: &LeaseMessage, now: Timestamp) -> bool {
        match self.message_timeout {
            Some(timeout) if msg.send_timestamp != Timestamp::ZERO => {
                msg.send_timestamp.saturating_add(timeout).is_before(now)
            }
            _ => false,
        }
    }

    fn fire(&self, event: impl FnOnce() -> Event) {
        if !self.handlers.is_empty() {
            self.handlers.fire_handlers(event());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        storage::MemDB,
        types::{LeaseValue, MasterEpoch, ProposalNumber},
    };

    const CELL: &str = "testcell";

    fn acceptor(kv_store: MemDB) -> Acceptor<MemDB> {
        Acceptor::new(
            kv_store,
            Address::localhost(12345),
            None,
            Arc::new(EventHandlers::default()),
        )
    }

    fn msg(msg_type: MessageType, counter: u64, proposer: u64) -> LeaseMessage {
        LeaseMessage::new(msg_type, CellId::new(CELL))
            .with_proposal_no(ProposalNumber::new(counter, proposer))
            .with_value(LeaseValue::new("me", Timestamp::from_millis(u64::MAX / 2)))
            .with_master_epoch(MasterEpoch::new(1))
    }

    fn msg_type_of(reply: Option<LeaseMessage>) -> Option<MessageType> {
        reply.map(|reply| reply.msg_type)
    }

    #[test]
    fn prepare_accept_learn() {
        let mut acceptor = acceptor(MemDB::new());

        let reply = acceptor.process_message(&msg(MessageType::Prepare, 1, 1)).unwrap();
        assert_eq!(msg_type_of(reply), Some(MessageType::PrepareAck));

        let reply = acceptor.process_message(&msg(MessageType::Accept, 1, 1)).unwrap();
        assert_eq!(msg_type_of(reply), Some(MessageType::AcceptAck));

        let reply = acceptor.process_message(&msg(MessageType::Learn, 1, 1)).unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn later_prepare_invalidates_earlier_accept() {
        let mut acceptor = acceptor(MemDB::new());

        let reply = acceptor.process_message(&msg(MessageType::Prepare, 1, 1)).unwrap();
        assert_eq!(msg_type_of(reply), Some(MessageType::PrepareAck));

        let reply = acceptor.process_message(&msg(MessageType::Prepare, 1, 2)).unwrap();
        assert_eq!(msg_type_of(reply), Some(MessageType::PrepareAck));

        let reply = acceptor
            .process_message(&msg(MessageType::Accept, 1, 1))
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::AcceptNack);
        assert_eq!(reply.proposal_no, ProposalNumber::new(1, 2));
    }

    #[test]
    fn prepare_ack_reports_previously_accepted_value() {
        let mut acceptor = acceptor(MemDB::new());
        acceptor.process_message(&msg(MessageType::Prepare, 1, 1)).unwrap();
        let accept = msg(MessageType::Accept, 1, 1)
            .with_value(LeaseValue::new("first", Timestamp::from_millis(500)))
            .with_master_epoch(MasterEpoch::new(7));
        acceptor.process_message(&accept).unwrap();

        let reply = acceptor
            .process_message(&LeaseMessage::new(MessageType::Prepare, CellId::new(CELL))
                .with_proposal_no(ProposalNumber::new(2, 3)))
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::PrepareAck);
        assert_eq!(reply.proposal_no, ProposalNumber::new(2, 3));
        assert_eq!(reply.value(), LeaseValue::new("first", Timestamp::from_millis(500)));
        assert_eq!(reply.master_epoch, MasterEpoch::new(7));
        assert_eq!(reply.sender, Some(Address::localhost(12345)));
    }

    #[test]
    fn prepare_below_accepted_is_nacked_with_accepted_value() {
        let mut acceptor = acceptor(MemDB::new());
        acceptor.process_message(&msg(MessageType::Accept, 5, 1)).unwrap();

        let reply = acceptor
            .process_message(&msg(MessageType::Prepare, 4, 9))
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::PrepareNack);
        assert_eq!(reply.proposal_no, ProposalNumber::new(5, 1));
        assert_eq!(reply.holder.as_str(), "me");
    }

    #[test]
    fn lease_is_only_visible_after_learn() {
        let mut acceptor = acceptor(MemDB::new());
        let cell = CellId::new(CELL);

        acceptor.process_message(&msg(MessageType::Prepare, 1, 1)).unwrap();
        acceptor
            .process_message(&msg(MessageType::Accept, 1, 1).with_value(LeaseValue::new(
                "me2",
                Timestamp::from_millis(1_000),
            )))
            .unwrap();
        assert_eq!(acceptor.get_local_lease_information(&cell).unwrap(), None);

        acceptor
            .process_message(&msg(MessageType::Learn, 1, 1).with_value(LeaseValue::new(
                "me2",
                Timestamp::from_millis(1_000),
            )))
            .unwrap();
        let lease = acceptor.get_local_lease_information(&cell).unwrap().unwrap();
        assert_eq!(lease.holder.as_str(), "me2");
        assert_eq!(lease.timeout, Timestamp::from_millis(1_000));
        assert_eq!(lease.proposal_no, ProposalNumber::new(1, 1));
    }

    #[test]
    fn replayed_or_older_learn_does_not_regress() {
        let mut acceptor = acceptor(MemDB::new());
        let cell = CellId::new(CELL);

        acceptor
            .process_message(&msg(MessageType::Learn, 3, 1).with_value(LeaseValue::new(
                "new",
                Timestamp::from_millis(3_000),
            )))
            .unwrap();
        for counter in [3, 2] {
            acceptor
                .process_message(&msg(MessageType::Learn, counter, 1).with_value(LeaseValue::new(
                    "old",
                    Timestamp::from_millis(1),
                )))
                .unwrap();
        }

        let lease = acceptor.get_local_lease_information(&cell).unwrap().unwrap();
        assert_eq!(lease.holder.as_str(), "new");

        // The learned ballot also binds later ACCEPTs.
        let reply = acceptor
            .process_message(&msg(MessageType::Accept, 2, 5))
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::AcceptNack);
    }

    #[test]
    fn learn_fires_handler() {
        let learned = Arc::new(Mutex::new(Vec::new()));
        let learned_clone = learned.clone();
        let handlers = EventHandlers::new(
            false,
            None,
            None,
            None,
            Some(Box::new(move |event: &LearnEvent| {
                learned_clone.lock().unwrap().push(event.lease())
            })),
        );
        let mut acceptor = Acceptor::new(
            MemDB::new(),
            Address::localhost(1),
            None,
            Arc::new(handlers),
        );

        acceptor.process_message(&msg(MessageType::Learn, 1, 1)).unwrap();
        acceptor.process_message(&msg(MessageType::Learn, 1, 1)).unwrap();

        let learned = learned.lock().unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].cell_id, CellId::new(CELL));
        assert_eq!(learned[0].master_epoch, MasterEpoch::new(1));
    }

    #[test]
    fn storage_failure_is_returned_instead_of_ack() {
        let kv_store = MemDB::new();
        let mut acceptor = acceptor(kv_store.clone());

        kv_store.fail_writes(true);
        assert!(acceptor.process_message(&msg(MessageType::Prepare, 1, 1)).is_err());
        assert!(acceptor.process_message(&msg(MessageType::Accept, 1, 1)).is_err());
        assert!(acceptor.process_message(&msg(MessageType::Learn, 1, 1)).is_err());

        // Nothing was cached, so the same ballot is still admitted once the store recovers.
        kv_store.fail_writes(false);
        let reply = acceptor.process_message(&msg(MessageType::Accept, 1, 1)).unwrap();
        assert_eq!(msg_type_of(reply), Some(MessageType::AcceptAck));
        assert_eq!(
            acceptor.get_local_lease_information(&CellId::new(CELL)).unwrap(),
            None
        );
    }

    #[test]
    fn state_is_reloaded_from_store() {
        let kv_store = MemDB::new();
        let mut first = acceptor(kv_store.clone());
        first.process_message(&msg(MessageType::Prepare, 4, 1)).unwrap();
        drop(first);

        let mut second = acceptor(kv_store);
        let reply = second
            .process_message(&msg(MessageType::Accept, 3, 1))
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::AcceptNack);
        assert_eq!(reply.proposal_no, ProposalNumber::new(4, 1));
    }

    #[test]
    fn unserved_types_get_no_reply() {
        let mut acceptor = acceptor(MemDB::new());
        for msg_type in [
            MessageType::PrepareAck,
            MessageType::AcceptNack,
            MessageType::EventRestart,
            MessageType::EventTimeout,
        ] {
            assert!(acceptor.process_message(&msg(msg_type, 1, 1)).unwrap().is_none());
        }
    }

    #[test]
    fn expired_messages_are_dropped() {
        let mut acceptor = Acceptor::new(
            MemDB::new(),
            Address::localhost(1),
            Some(Duration::from_millis(100)),
            Arc::new(EventHandlers::default()),
        );

        let stale = msg(MessageType::Prepare, 2, 1)
            .stamped(Address::localhost(2), Timestamp::from_millis(1_000));
        assert!(acceptor.process_message(&stale).unwrap().is_none());

        // The dropped PREPARE did not raise the promise.
        let fresh = msg(MessageType::Prepare, 1, 1).stamped(Address::localhost(2), Timestamp::now());
        let reply = acceptor.process_message(&fresh).unwrap();
        assert_eq!(msg_type_of(reply), Some(MessageType::PrepareAck));
    }
}
