/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the acceptor's
//! [configuration](crate::acceptor::AcceptorConfiguration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [Learn](crate::events::LearnEvent) is printed:
//!
//! ```text
//! Learn, 1701329264, queue-7, 12, 3, node-a, 1701329294000, 2
//! ```
//!
//! In the snippet:
//! - The third value is the cell id.
//! - The fourth and fifth values are the ballot counter and the proposer identity of the proposal.
//! - The sixth value is the lease holder.
//! - The seventh value is the lease timeout (milliseconds since the Unix Epoch).
//! - The eighth value is the master epoch.

use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const PROMISE: &str = "Promise";
pub const ACCEPT: &str = "Accept";
pub const REJECT: &str = "Reject";
pub const LEARN: &str = "Learn";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send + Sync>;
}

impl Logger for PromiseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send + Sync> {
        let logger = |promise_event: &PromiseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROMISE,
                secs_since_unix_epoch(promise_event.timestamp),
                promise_event.cell_id,
                promise_event.proposal_no.counter,
                promise_event.proposal_no.proposer
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send + Sync> {
        let logger = |accept_event: &AcceptEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}, {}",
                ACCEPT,
                secs_since_unix_epoch(accept_event.timestamp),
                accept_event.cell_id,
                accept_event.proposal_no.counter,
                accept_event.proposal_no.proposer,
                accept_event.holder,
                accept_event.lease_timeout,
                accept_event.master_epoch
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send + Sync> {
        let logger = |reject_event: &RejectEvent| {
            log::info!(
                "{}, {}, {}, {:?}, {}, {}, {}, {}",
                REJECT,
                secs_since_unix_epoch(reject_event.timestamp),
                reject_event.cell_id,
                reject_event.rejected,
                reject_event.proposal_no.counter,
                reject_event.proposal_no.proposer,
                reject_event.conflicting.counter,
                reject_event.conflicting.proposer
            )
        };
        Box::new(logger)
    }
}

impl Logger for LearnEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send + Sync> {
        let logger = |learn_event: &LearnEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}, {}",
                LEARN,
                secs_since_unix_epoch(learn_event.timestamp),
                learn_event.cell_id,
                learn_event.proposal_no.counter,
                learn_event.proposal_no.proposer,
                learn_event.holder,
                learn_event.lease_timeout,
                learn_event.master_epoch
            )
        };
        Box::new(logger)
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_secs())
        .unwrap_or(0)
}
