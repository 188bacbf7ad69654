/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::time::Duration;

use typed_builder::TypedBuilder;

use super::SimulatorError;

/// Longest delay a packet can be given, about 49 days.
pub const MAX_DELAY: Duration = Duration::from_millis(u32::MAX as u64);

/// Fault-injection parameters of a [`Communicator`](super::Communicator).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [SimulatorConfig]. Every parameter is optional; the defaults describe
    a perfect network (no loss, no delay, no host outages) with seed 0.
    "))]
pub struct SimulatorConfig {
    #[builder(default = 0, setter(doc = "Set the percentage (0..=100) of packets that are lost. Optional, defaults to 0."))]
    pub packet_loss_pct: u8,
    #[builder(default = Duration::ZERO, setter(doc = "Set the minimum delay of a delayed packet. Optional, defaults to zero."))]
    pub min_delay: Duration,
    #[builder(default = Duration::ZERO, setter(doc = "Set the maximum delay of a delayed packet. Optional, defaults to zero."))]
    pub max_delay: Duration,
    #[builder(default = 0, setter(doc = "Set the percentage (0..=100) of packets that are delayed. Optional, defaults to 0."))]
    pub delay_pct: u8,
    #[builder(default = false, setter(doc = "If true, a blocked port can still receive but cannot send. If false, a blocked port neither sends nor receives. Optional, defaults to false."))]
    pub half_link: bool,
    #[builder(default = 0.0, setter(doc = "Set the probability (0..=1) that a host becomes unavailable in a churn round. Optional, defaults to 0."))]
    pub host_unavailability_probability: f64,
    #[builder(default = 0.0, setter(doc = "Set the probability (0..=1) that a blocked host recovers in a churn round. This value is multiplied by the number of rounds the host has been blocked. Optional, defaults to 0."))]
    pub host_recovery_probability: f64,
    #[builder(default = 0, setter(doc = "Set the seed of every random decision the simulator makes. Optional, defaults to 0."))]
    pub seed: u64,
    #[builder(default = Duration::from_millis(50), setter(doc = "Set the tick interval of the delayed-delivery thread. Optional, defaults to 50 ms."))]
    pub tick: Duration,
    #[builder(default = 10, setter(doc = "Set the number of ticks between two availability churn rounds. Optional, defaults to 10."))]
    pub churn_every_ticks: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig::builder().build()
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SimulatorError> {
        let invalid = |reason: &'static str| Err(SimulatorError::InvalidConfig(reason));

        if self.packet_loss_pct > 100 {
            return invalid("packet_loss_pct must be at most 100");
        }
        if self.delay_pct > 100 {
            return invalid("delay_pct must be at most 100");
        }
        if self.min_delay > self.max_delay {
            return invalid("min_delay must not exceed max_delay");
        }
        if self.max_delay > MAX_DELAY {
            return invalid("max_delay must be at most u32::MAX milliseconds");
        }
        if !(0.0..=1.0).contains(&self.host_unavailability_probability) {
            return invalid("host_unavailability_probability must lie in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.host_recovery_probability) {
            return invalid("host_recovery_probability must lie in [0, 1]");
        }
        if self.tick.is_zero() {
            return invalid("tick must be positive");
        }
        if self.churn_every_ticks == 0 {
            return invalid("churn_every_ticks must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick, Duration::from_millis(50));
        assert_eq!(config.churn_every_ticks, 10);
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let configs = [
            SimulatorConfig::builder().packet_loss_pct(101).build(),
            SimulatorConfig::builder().delay_pct(200).build(),
            SimulatorConfig::builder()
                .min_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(5))
                .build(),
            SimulatorConfig::builder().max_delay(Duration::MAX).build(),
            SimulatorConfig::builder()
                .max_delay(MAX_DELAY + Duration::from_millis(1))
                .build(),
            SimulatorConfig::builder().host_recovery_probability(1.5).build(),
            SimulatorConfig::builder().host_unavailability_probability(f64::NAN).build(),
            SimulatorConfig::builder().tick(Duration::ZERO).build(),
            SimulatorConfig::builder().churn_every_ticks(0).build(),
        ];
        for config in configs {
            assert!(matches!(
                config.validate(),
                Err(SimulatorError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn longest_delay_is_accepted() {
        let config = SimulatorConfig::builder()
            .delay_pct(100)
            .min_delay(MAX_DELAY)
            .max_delay(MAX_DELAY)
            .build();
        assert!(config.validate().is_ok());
    }
}
