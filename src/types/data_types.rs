/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    time::{Duration, SystemTime},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Opaque identifier of a cell, the named resource that is leased.
///
/// A cell has exactly one acceptor state per acceptor, created lazily on the first message that names
/// it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct CellId(String);

impl CellId {
    /// Create a new `CellId` from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the UTF-8 bytes of the identifier. Used to build storage keys.
    pub fn bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for CellId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of the peer that holds (or is proposed to hold) a lease.
///
/// The empty string means "no holder", which is what acceptors reply with when they have not accepted
/// any value for a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct LeaseHolder(String);

impl LeaseHolder {
    pub fn new(holder: impl Into<String>) -> Self {
        Self(holder.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for LeaseHolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for LeaseHolder {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Per-cell restart counter.
///
/// Every process incarnation that opens a cell durably stores a strictly greater `MasterEpoch` than any
/// previously observed for that cell before it issues leases, see [`crate::master_epoch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct MasterEpoch(u64);

impl MasterEpoch {
    /// The epoch of a cell that has never been opened.
    pub const ZERO: MasterEpoch = MasterEpoch(0);

    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `MasterEpoch`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// The epoch that directly follows this one, or `None` if this is the last representable epoch.
    pub const fn next(&self) -> Option<MasterEpoch> {
        match self.0.checked_add(1) {
            Some(int) => Some(MasterEpoch(int)),
            None => None,
        }
    }
}

impl Display for MasterEpoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Absolute point in time, as milliseconds since the Unix Epoch.
///
/// Lease timeouts and message send timestamps are absolute, so that they keep their meaning after being
/// persisted or sent to another process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    /// The current wall clock time.
    pub fn now() -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|since_epoch| since_epoch.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn millis(&self) -> u64 {
        self.0
    }

    /// This timestamp moved `duration` into the future, saturating at `u64::MAX` milliseconds.
    pub fn saturating_add(&self, duration: Duration) -> Timestamp {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }

    /// Whether this timestamp lies strictly before `now`.
    pub fn is_before(&self, now: Timestamp) -> bool {
        self.0 < now.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Integer port under which an endpoint is registered in the network simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Port(u16);

impl Port {
    pub const fn new(int: u16) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u16 {
        self.0
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Network address of a peer: a host name and a [`Port`].
///
/// The simulator routes only on the port; the host is informational.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Address {
    pub host: String,
    pub port: Port,
}

impl Address {
    pub fn new(host: impl Into<String>, port: Port) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Shorthand for an address on `localhost`, which is what every simulated endpoint uses.
    pub fn localhost(port: u16) -> Self {
        Self::new("localhost", Port::new(port))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_saturates_instead_of_overflowing() {
        let late = Timestamp::from_millis(u64::MAX - 5);
        assert_eq!(
            late.saturating_add(Duration::from_millis(10)),
            Timestamp::from_millis(u64::MAX)
        );
        assert!(Timestamp::from_millis(10).is_before(Timestamp::from_millis(11)));
        assert!(!Timestamp::from_millis(11).is_before(Timestamp::from_millis(11)));
    }

    #[test]
    fn master_epoch_next_is_strictly_greater() {
        let epoch = MasterEpoch::new(41);
        assert_eq!(epoch.next(), Some(MasterEpoch::new(42)));
        assert!(epoch.next().unwrap() > epoch);
        assert_eq!(MasterEpoch::new(u64::MAX).next(), None);
        assert_eq!(MasterEpoch::default(), MasterEpoch::ZERO);
    }

    #[test]
    fn address_display() {
        assert_eq!(Address::localhost(12345).to_string(), "localhost:12345");
    }
}
