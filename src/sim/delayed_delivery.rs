/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that redelivers delayed packets and simulates hosts going down and coming back.
//!
//! Every tick, each pending packet has waited one tick longer. A packet whose accumulated wait has
//! reached its delay is marked as requeued and pushed back onto the communicator's queue, where it is
//! neither lost nor delayed again. Every `churn_every_ticks` ticks, the thread runs one round of
//! [availability churn](super::network::availability_churn).
//!
//! Packets still waiting out their delay when the thread shuts down are abandoned.

use std::{
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use rand::rngs::StdRng;

use super::{
    communicator::{Packet, QueueItem},
    network::{availability_churn, NetworkState},
    stats::{Counter, SimulatorStats},
    SimulatorConfig,
};

struct DelayedPacket {
    packet: Packet,
    delay: Duration,
    waited: Duration,
}

pub(crate) struct DelayedDelivery {
    config: SimulatorConfig,
    rng: StdRng,
    network: Arc<Mutex<NetworkState>>,
    stats: Arc<SimulatorStats>,
    queue: Sender<QueueItem>,
    incoming: Receiver<(Packet, Duration)>,
    shutdown_signal: Receiver<()>,
    pending: Vec<DelayedPacket>,
}

impl DelayedDelivery {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SimulatorConfig,
        rng: StdRng,
        network: Arc<Mutex<NetworkState>>,
        stats: Arc<SimulatorStats>,
        queue: Sender<QueueItem>,
        incoming: Receiver<(Packet, Duration)>,
        shutdown_signal: Receiver<()>,
    ) -> DelayedDelivery {
        DelayedDelivery {
            config,
            rng,
            network,
            stats,
            queue,
            incoming,
            shutdown_signal,
            pending: Vec::new(),
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut ticks_since_churn = 0;
            loop {
                match self.shutdown_signal.recv_timeout(self.config.tick) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        if !self.pending.is_empty() {
                            log::debug!(
                                "Abandoning {} delayed packets on shutdown",
                                self.pending.len()
                            );
                        }
                        return;
                    }
                    Err(RecvTimeoutError::Timeout) => (),
                }

                self.accept_incoming();
                self.tick();

                ticks_since_churn += 1;
                if ticks_since_churn == self.config.churn_every_ticks {
                    ticks_since_churn = 0;
                    let mut network = self.network.lock().unwrap();
                    availability_churn(
                        &mut network,
                        &mut self.rng,
                        self.config.host_unavailability_probability,
                        self.config.host_recovery_probability,
                    );
                }
            }
        })
    }

    fn accept_incoming(&mut self) {
        loop {
            match self.incoming.try_recv() {
                Ok((packet, delay)) => self.pending.push(DelayedPacket {
                    packet,
                    delay,
                    waited: Duration::ZERO,
                }),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn tick(&mut self) {
        let tick = self.config.tick;
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for mut delayed in self.pending.drain(..) {
            delayed.waited += tick;
            if delayed.waited >= delayed.delay {
                let mut packet = delayed.packet;
                packet.requeued = true;
                self.stats.increment(Counter::Requeued);
                // Fails only once the consumer has exited, in which case the packet is abandoned.
                let _ = self.queue.send(QueueItem::Packet(packet));
            } else {
                still_pending.push(delayed);
            }
        }
        self.pending = still_pending;
    }
}
