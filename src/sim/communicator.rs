/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The routing fabric of the network simulator.
//!
//! Senders enqueue packets on an unbounded FIFO through a [`CommunicatorHandle`]. A single consumer
//! thread takes packets off the queue and, for each packet:
//! 1. Drops it if the recipient port is not open.
//! 2. Drops it if the sender port is blocked, or (unless `half_link` is set) the recipient port is
//!    blocked.
//! 3. Unless it was already requeued after a delay, drops it with probability `packet_loss_pct / 100`.
//! 4. Unless it was already requeued after a delay, hands it to the
//!    [delayed-delivery](super::delayed_delivery) thread with probability `delay_pct / 100`, with a
//!    delay drawn uniformly from `[min_delay, max_delay]` (in whole milliseconds).
//! 5. Otherwise delivers it to the recipient's [`Endpoint`]. An endpoint that reports it is shutting
//!    down is ignored.
//!
//! Every participant of a simulation gets the instance it runs in injected as a handle; there is no
//! global simulator.

use std::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{messages::LeaseMessage, types::Port};

use super::{
    delayed_delivery::DelayedDelivery,
    network::NetworkState,
    stats::{Counter, SimulatorStats},
    Endpoint, EndpointError, SimulatorConfig, SimulatorError,
};

pub(crate) struct Packet {
    pub(crate) message: LeaseMessage,
    pub(crate) recipient: Port,
    /// Set once the packet went through delayed delivery. A requeued packet is neither lost nor delayed
    /// again.
    pub(crate) requeued: bool,
}

pub(crate) enum QueueItem {
    Packet(Packet),
    /// Marks the end of the queue. The consumer exits after processing every packet ahead of it.
    Shutdown,
}

/// A cloneable handle to a running [`Communicator`], used by simulated peers to send messages and to
/// open and close their ports, and by tests to block and unblock ports.
#[derive(Clone)]
pub struct CommunicatorHandle {
    queue: Sender<QueueItem>,
    network: Arc<Mutex<NetworkState>>,
    stats: Arc<SimulatorStats>,
}

impl CommunicatorHandle {
    /// Enqueue `message` for delivery to the endpoint registered under `recipient`. The sender port is
    /// taken from `message.sender`.
    pub fn send(&self, recipient: Port, message: LeaseMessage) {
        self.stats.increment(Counter::Sent);
        let _ = self.queue.send(QueueItem::Packet(Packet {
            message,
            recipient,
            requeued: false,
        }));
    }

    pub fn open_port(&self, port: Port, endpoint: Arc<dyn Endpoint>) -> Result<(), SimulatorError> {
        self.network.lock().unwrap().open_port(port, endpoint)
    }

    /// Register `endpoint` under a random free port in `1..=65000`, trying at most five ports.
    pub fn open_any_port(&self, endpoint: Arc<dyn Endpoint>) -> Result<Port, SimulatorError> {
        self.network.lock().unwrap().open_any_port(endpoint)
    }

    pub fn close_port(&self, port: Port) {
        self.network.lock().unwrap().ports.remove(&port);
    }

    /// Block `port` as if its host went down. Does nothing if the port is already blocked.
    pub fn block_port(&self, port: Port) {
        self.network.lock().unwrap().blocked.entry(port).or_insert(1);
    }

    pub fn unblock_port(&self, port: Port) {
        self.network.lock().unwrap().blocked.remove(&port);
    }

    /// The number of churn rounds `port` has been blocked for, or `None` if it is not blocked.
    pub fn blocked_rounds(&self, port: Port) -> Option<u32> {
        self.network.lock().unwrap().blocked.get(&port).copied()
    }

    pub fn blocked_ports(&self) -> Vec<Port> {
        self.network.lock().unwrap().blocked.keys().copied().collect()
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }
}

/// A handle to the threads of a running network simulator. When this value is dropped, delayed
/// delivery stops (abandoning delayed packets), the consumer processes every packet queued before the
/// drop and exits, and every port is closed.
pub struct Communicator {
    handle: CommunicatorHandle,
    consumer: Option<JoinHandle<()>>,
    delayed_delivery: Option<JoinHandle<()>>,
    delayed_delivery_shutdown: Sender<()>,
}

impl Communicator {
    pub fn start(config: SimulatorConfig) -> Result<Communicator, SimulatorError> {
        config.validate()?;

        // Each thread gets a generator of its own, derived from the configured seed.
        let mut seeder = StdRng::seed_from_u64(config.seed);
        let consumer_rng = StdRng::seed_from_u64(seeder.gen());
        let delayed_delivery_rng = StdRng::seed_from_u64(seeder.gen());
        let port_rng = StdRng::seed_from_u64(seeder.gen());

        let (queue, queue_receiver) = mpsc::channel();
        let (to_delayed_delivery, delayed_delivery_incoming) = mpsc::channel();
        let (delayed_delivery_shutdown, delayed_delivery_shutdown_receiver) = mpsc::channel();
        let network = Arc::new(Mutex::new(NetworkState::new(port_rng)));
        let stats = Arc::new(SimulatorStats::default());

        let delayed_delivery = DelayedDelivery::new(
            config.clone(),
            delayed_delivery_rng,
            network.clone(),
            stats.clone(),
            queue.clone(),
            delayed_delivery_incoming,
            delayed_delivery_shutdown_receiver,
        )
        .start();

        let consumer = Consumer {
            config,
            rng: consumer_rng,
            network: network.clone(),
            stats: stats.clone(),
            queue: queue_receiver,
            to_delayed_delivery,
        }
        .start();

        Ok(Communicator {
            handle: CommunicatorHandle {
                queue,
                network,
                stats,
            },
            consumer: Some(consumer),
            delayed_delivery: Some(delayed_delivery),
            delayed_delivery_shutdown,
        })
    }

    pub fn handle(&self) -> CommunicatorHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> &SimulatorStats {
        self.handle.stats()
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        let _ = self.delayed_delivery_shutdown.send(());
        if let Some(delayed_delivery) = self.delayed_delivery.take() {
            let _ = delayed_delivery.join();
        }

        let _ = self.handle.queue.send(QueueItem::Shutdown);
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }

        match self.handle.network.lock() {
            Ok(mut network) => network.ports.clear(),
            Err(poisoned) => poisoned.into_inner().ports.clear(),
        }
    }
}

struct Consumer {
    config: SimulatorConfig,
    rng: StdRng,
    network: Arc<Mutex<NetworkState>>,
    stats: Arc<SimulatorStats>,
    queue: Receiver<QueueItem>,
    to_delayed_delivery: Sender<(Packet, Duration)>,
}

impl Consumer {
    fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.queue.recv() {
                Ok(QueueItem::Packet(packet)) => self.process(packet),
                Ok(QueueItem::Shutdown) | Err(_) => return,
            }
        })
    }

    fn process(&mut self, packet: Packet) {
        let sender = packet.message.sender.as_ref().map(|address| address.port);

        let recipient = {
            let network = self.network.lock().unwrap();
            let recipient = match network.ports.get(&packet.recipient) {
                Some(recipient) => recipient.clone(),
                None => {
                    self.stats.increment(Counter::DroppedClosed);
                    return;
                }
            };
            if let Some(sender) = sender.filter(|port| network.is_blocked(*port)) {
                log::debug!("msg dropped, port blocked {}", sender);
                self.stats.increment(Counter::DroppedBlocked);
                return;
            }
            if !self.config.half_link && network.is_blocked(packet.recipient) {
                log::debug!("msg dropped, port blocked {}", packet.recipient);
                self.stats.increment(Counter::DroppedBlocked);
                return;
            }
            recipient
        };

        if !packet.requeued {
            if self.drop_packet() {
                log::debug!("msg lost {} -> {}", display_port(sender), packet.recipient);
                self.stats.increment(Counter::Lost);
                return;
            }
            if let Some(delay) = self.delay_packet() {
                log::debug!(
                    "msg delayed {} ms {} -> {}",
                    delay.as_millis(),
                    display_port(sender),
                    packet.recipient
                );
                self.stats.increment(Counter::Delayed);
                let _ = self.to_delayed_delivery.send((packet, delay));
                return;
            }
        }

        self.stats.increment(Counter::Delivered);
        match recipient.receive_message(packet.message) {
            Ok(()) => (),
            Err(EndpointError::ShuttingDown) => {
                self.stats.increment(Counter::EndpointShutdown);
            }
        }
    }

    fn drop_packet(&mut self) -> bool {
        self.config.packet_loss_pct > 0
            && self.rng.gen_range(0, 100) < self.config.packet_loss_pct
    }

    /// `None` if the packet is to be delivered right away.
    fn delay_packet(&mut self) -> Option<Duration> {
        if self.config.delay_pct == 0 || self.rng.gen_range(0, 100) >= self.config.delay_pct {
            return None;
        }
        let min = u64::try_from(self.config.min_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.config.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay = min + self.rng.gen_range(0, max.saturating_sub(min).saturating_add(1));
        if delay == 0 {
            None
        } else {
            Some(Duration::from_millis(delay))
        }
    }
}

fn display_port(port: Option<Port>) -> String {
    port.map(|port| port.to_string())
        .unwrap_or_else(|| String::from("?"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::MAX_DELAY;

    fn consumer_with(config: SimulatorConfig) -> Consumer {
        let (_, queue) = mpsc::channel();
        let (to_delayed_delivery, _) = mpsc::channel();
        Consumer {
            config,
            rng: StdRng::seed_from_u64(0),
            network: Arc::new(Mutex::new(NetworkState::new(StdRng::seed_from_u64(0)))),
            stats: Arc::new(SimulatorStats::default()),
            queue,
            to_delayed_delivery,
        }
    }

    #[test]
    fn delays_stay_within_bounds() {
        let mut consumer = consumer_with(
            SimulatorConfig::builder()
                .delay_pct(100)
                .min_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(20))
                .build(),
        );
        for _ in 0..1000 {
            let delay = consumer.delay_packet().unwrap();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(20));
        }
    }

    #[test]
    fn extreme_delays_do_not_overflow() {
        let mut consumer = consumer_with(
            SimulatorConfig::builder()
                .delay_pct(100)
                .min_delay(MAX_DELAY)
                .max_delay(MAX_DELAY)
                .build(),
        );
        assert_eq!(consumer.delay_packet(), Some(MAX_DELAY));

        // Rejected by `validate`, but must not bring the consumer down either.
        let mut consumer = consumer_with(
            SimulatorConfig::builder()
                .delay_pct(100)
                .max_delay(Duration::MAX)
                .build(),
        );
        for _ in 0..100 {
            let _ = consumer.delay_packet();
        }
    }
}
