/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The routing table and the blocked-port set, shared between the communicator's consumer, the
//! delayed-delivery thread, and every [`CommunicatorHandle`](super::CommunicatorHandle).
//!
//! Both maps live behind one mutex, so checking whether a packet's ports are blocked and blocking or
//! unblocking a port never interleave.

use std::{collections::BTreeMap, sync::Arc};

use rand::{rngs::StdRng, Rng};

use crate::types::Port;

use super::{Endpoint, SimulatorError};

/// Number of random ports `open_any_port` tries before giving up.
const OPEN_ANY_PORT_TRIES: usize = 5;
const HIGHEST_RANDOM_PORT: u16 = 65000;

pub(crate) struct NetworkState {
    pub(crate) ports: BTreeMap<Port, Arc<dyn Endpoint>>,
    /// Blocked ports, mapped to the number of churn rounds they have been blocked for.
    pub(crate) blocked: BTreeMap<Port, u32>,
    port_rng: StdRng,
}

impl NetworkState {
    pub(crate) fn new(port_rng: StdRng) -> NetworkState {
        NetworkState {
            ports: BTreeMap::new(),
            blocked: BTreeMap::new(),
            port_rng,
        }
    }

    pub(crate) fn open_port(
        &mut self,
        port: Port,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<(), SimulatorError> {
        if self.ports.contains_key(&port) {
            return Err(SimulatorError::PortInUse(port));
        }
        self.ports.insert(port, endpoint);
        Ok(())
    }

    pub(crate) fn open_any_port(&mut self, endpoint: Arc<dyn Endpoint>) -> Result<Port, SimulatorError> {
        for _ in 0..OPEN_ANY_PORT_TRIES {
            let port = Port::new(self.port_rng.gen_range(1, HIGHEST_RANDOM_PORT + 1));
            if !self.ports.contains_key(&port) {
                self.ports.insert(port, endpoint);
                return Ok(port);
            }
        }
        Err(SimulatorError::NoFreePort)
    }

    pub(crate) fn is_blocked(&self, port: Port) -> bool {
        self.blocked.contains_key(&port)
    }
}

/// One round of simulated host churn.
///
/// Every blocked port recovers with probability `recovery_probability` times the number of rounds it
/// has been blocked, and otherwise stays blocked for one more round. Then, if fewer ports are blocked
/// than are open, one randomly chosen open, unblocked port becomes blocked with probability
/// `unavailability_probability`.
pub(crate) fn availability_churn<R: Rng>(
    state: &mut NetworkState,
    rng: &mut R,
    unavailability_probability: f64,
    recovery_probability: f64,
) {
    let blocked: Vec<Port> = state.blocked.keys().copied().collect();
    for port in blocked {
        let rounds = state.blocked.get(&port).copied().unwrap_or(1);
        if rng.gen::<f64>() < recovery_probability * rounds as f64 {
            state.blocked.remove(&port);
            log::debug!("unblocked {}", port);
        } else {
            state.blocked.insert(port, rounds + 1);
        }
    }

    if state.blocked.len() < state.ports.len() && rng.gen::<f64>() < unavailability_probability {
        let candidates: Vec<Port> = state
            .ports
            .keys()
            .filter(|port| !state.blocked.contains_key(*port))
            .copied()
            .collect();
        if !candidates.is_empty() {
            let victim = candidates[rng.gen_range(0, candidates.len())];
            state.blocked.insert(victim, 1);
            log::debug!("blocked {}", victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::sim::ChannelEndpoint;

    fn state_with_ports(ports: &[u16]) -> NetworkState {
        let mut state = NetworkState::new(StdRng::seed_from_u64(0));
        for port in ports {
            let (endpoint, _) = ChannelEndpoint::new();
            state.open_port(Port::new(*port), Arc::new(endpoint)).unwrap();
        }
        state
    }

    #[test]
    fn certain_unavailability_blocks_one_port_per_round() {
        let mut state = state_with_ports(&[1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(7);

        availability_churn(&mut state, &mut rng, 1.0, 0.0);
        assert_eq!(state.blocked.len(), 1);
        availability_churn(&mut state, &mut rng, 1.0, 0.0);
        assert_eq!(state.blocked.len(), 2);
        availability_churn(&mut state, &mut rng, 1.0, 0.0);
        assert_eq!(state.blocked.len(), 3);

        // Every open port is blocked, so nothing more can be blocked.
        availability_churn(&mut state, &mut rng, 1.0, 0.0);
        assert_eq!(state.blocked.len(), 3);
    }

    #[test]
    fn blocked_rounds_grow_while_port_stays_blocked() {
        let mut state = state_with_ports(&[1, 2]);
        state.blocked.insert(Port::new(1), 1);
        let mut rng = StdRng::seed_from_u64(3);

        let mut last = 1;
        for _ in 0..20 {
            availability_churn(&mut state, &mut rng, 0.0, 0.0);
            let rounds = state.blocked[&Port::new(1)];
            assert!(rounds > last);
            last = rounds;
        }
        assert!(!state.is_blocked(Port::new(2)));
    }

    #[test]
    fn recovery_becomes_certain_as_downtime_grows() {
        let mut state = state_with_ports(&[1]);
        state.blocked.insert(Port::new(1), 1);
        let mut rng = StdRng::seed_from_u64(11);

        // With probability 0.25 per round of downtime, the port is back after at most four rounds.
        for _ in 0..4 {
            availability_churn(&mut state, &mut rng, 0.0, 0.25);
        }
        assert!(!state.is_blocked(Port::new(1)));
    }

    #[test]
    fn open_port_refuses_ports_in_use() {
        let mut state = state_with_ports(&[10]);
        let (endpoint, _) = ChannelEndpoint::new();
        assert!(matches!(
            state.open_port(Port::new(10), Arc::new(endpoint)),
            Err(SimulatorError::PortInUse(_))
        ));

        let (endpoint, _) = ChannelEndpoint::new();
        let port = state.open_any_port(Arc::new(endpoint)).unwrap();
        assert!(port.int() >= 1 && port.int() <= HIGHEST_RANDOM_PORT);
        assert!(state.ports.contains_key(&port));
    }
}
