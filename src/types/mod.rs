//! Types that are used across the acceptor, the master epoch handler, and the network simulator.
//!
//! Types specific to a single component (e.g., the acceptor's persisted cell state) live in the
//! module of that component, e.g., [`crate::acceptor::cell_state`].

pub mod data_types;

pub mod proposal;

pub mod lease;

pub use data_types::{Address, CellId, LeaseHolder, MasterEpoch, Port, Timestamp};
pub use lease::{LeaseValue, LearnedLease};
pub use proposal::{ProposalNumber, ProposerId};
