//! Flease: leases on named cells, agreed on by a group of acceptors through Paxos-style voting.
//!
//! A proposer that wants to hold the lease on a cell runs two phases against the acceptors of the
//! cell. It first reserves a [ballot](types::ProposalNumber) with PREPARE, then asks the acceptors to
//! accept a [lease](types::LeaseValue) with ACCEPT. Once a majority accepted, it broadcasts LEARN,
//! after which every acceptor reports the lease as the current one.
//!
//! This crate implements:
//! - The [acceptor](acceptor), with its per-cell state persisted in a pluggable
//!   [key-value store](storage).
//! - The per-cell [master epoch](master_epoch), a restart counter that keeps leases issued by a
//!   previous incarnation of a process apart from current ones.
//! - A [network simulator](sim) that delivers [messages](messages) between in-process peers while
//!   injecting loss, delay, and host outages.

pub mod types;

pub mod messages;

pub mod storage;

pub mod acceptor;

pub mod master_epoch;

pub mod sim;

pub mod events;

pub(crate) mod event_handlers;

pub(crate) mod logging;
