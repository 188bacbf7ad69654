/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of what happened to the packets that went through a communicator.
///
/// A packet that was delayed is counted twice: once as `delayed` and once more (as `delivered`, or as
/// one of the drop counters) after it was requeued.
#[derive(Default, Debug)]
pub struct SimulatorStats {
    sent: AtomicU64,
    delivered: AtomicU64,
    lost: AtomicU64,
    dropped_blocked: AtomicU64,
    dropped_closed: AtomicU64,
    delayed: AtomicU64,
    requeued: AtomicU64,
    endpoint_shutdown: AtomicU64,
}

#[derive(Clone, Copy)]
pub(crate) enum Counter {
    Sent,
    Delivered,
    Lost,
    DroppedBlocked,
    DroppedClosed,
    Delayed,
    Requeued,
    EndpointShutdown,
}

impl SimulatorStats {
    pub(crate) fn increment(&self, counter: Counter) {
        let counter = match counter {
            Counter::Sent => &self.sent,
            Counter::Delivered => &self.delivered,
            Counter::Lost => &self.lost,
            Counter::DroppedBlocked => &self.dropped_blocked,
            Counter::DroppedClosed => &self.dropped_closed,
            Counter::Delayed => &self.delayed,
            Counter::Requeued => &self.requeued,
            Counter::EndpointShutdown => &self.endpoint_shutdown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Packets handed to `send`.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Packets handed to the recipient endpoint, including those the endpoint refused because it was
    /// shutting down.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Packets dropped by the loss roll.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    pub fn dropped_blocked(&self) -> u64 {
        self.dropped_blocked.load(Ordering::Relaxed)
    }

    pub fn dropped_closed(&self) -> u64 {
        self.dropped_closed.load(Ordering::Relaxed)
    }

    pub fn delayed(&self) -> u64 {
        self.delayed.load(Ordering::Relaxed)
    }

    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    pub fn endpoint_shutdown(&self) -> u64 {
        self.endpoint_shutdown.load(Ordering::Relaxed)
    }
}
