//! An in-process network simulator for testing the lease protocol under message loss, message delay,
//! and hosts going down.
//!
//! A simulation runs on a [`Communicator`]. Peers register an [`Endpoint`] under a [`Port`] and send
//! messages through a [`CommunicatorHandle`]:
//!
//! ```ignore
//! let communicator = Communicator::start(
//!     SimulatorConfig::builder()
//!         .packet_loss_pct(10)
//!         .delay_pct(20)
//!         .min_delay(Duration::from_millis(10))
//!         .max_delay(Duration::from_millis(100))
//!         .seed(42)
//!         .build(),
//! )?;
//!
//! let (endpoint, inbox) = ChannelEndpoint::new();
//! communicator.handle().open_port(Port::new(1), Arc::new(endpoint))?;
//! communicator.handle().send(Port::new(1), message);
//! ```
//!
//! Every random decision is drawn from generators seeded with [`SimulatorConfig::seed`], so the sequence
//! of decisions is reproducible. Which packet meets which decision still depends on thread scheduling.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use crate::types::Port;

pub mod communicator;

pub mod config;

pub(crate) mod delayed_delivery;

pub mod endpoint;

pub(crate) mod network;

pub mod peer;

pub mod stats;

pub use communicator::{Communicator, CommunicatorHandle};
pub use config::SimulatorConfig;
pub use endpoint::{ChannelEndpoint, Endpoint, EndpointError};
pub use peer::SimulatedAcceptor;
pub use stats::SimulatorStats;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorError {
    PortInUse(Port),
    /// `open_any_port` did not find a free port within its tries.
    NoFreePort,
    InvalidConfig(&'static str),
}

impl Display for SimulatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::PortInUse(port) => write!(f, "port {} is already open", port),
            SimulatorError::NoFreePort => write!(f, "no free port found"),
            SimulatorError::InvalidConfig(reason) => {
                write!(f, "invalid simulator configuration: {}", reason)
            }
        }
    }
}

impl Error for SimulatorError {}
