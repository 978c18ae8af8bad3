//! Simulated trip durations

use std::time::Duration;

use rand::Rng;

use crate::{Driver, Passenger};

/// Whole milliseconds in `duration`, capped at [`u64::MAX`]
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Source of simulated durations for a trip
///
/// The drive itself always takes the passenger's own travel time; the timer
/// only decides how long it takes the driver to reach the passenger.
pub trait TripTimer: Send + Sync {
    /// Time `driver` needs to pick up `passenger`
    fn pickup_time(&self, driver: &Driver, passenger: &Passenger) -> Duration;
}

/// Pickup times drawn uniformly from `0..=max_pickup`
#[derive(Clone, Copy, Debug)]
pub struct RandomTimer {
    max_pickup: Duration,
}

impl RandomTimer {
    /// Create a [`RandomTimer`]
    pub fn new(max_pickup: Duration) -> Self {
        Self { max_pickup }
    }
}

impl TripTimer for RandomTimer {
    fn pickup_time(&self, _driver: &Driver, _passenger: &Passenger) -> Duration {
        let millis = saturating_millis(self.max_pickup);
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// The same pickup time for every trip
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedTimer(pub Duration);

impl TripTimer for FixedTimer {
    #[inline]
    fn pickup_time(&self, _driver: &Driver, _passenger: &Passenger) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::from_micros(999)), 0);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn random_pickup_with_unbounded_maximum() {
        let timer = RandomTimer::new(Duration::MAX);
        let driver = Driver::new("D");
        let passenger = Passenger::new("P", Duration::ZERO);
        // a wrapped maximum would almost always land far below u32::MAX ms
        let picks = (0..16)
            .map(|_| timer.pickup_time(&driver, &passenger))
            .filter(|d| *d > Duration::from_millis(u64::from(u32::MAX)))
            .count();
        assert!(picks > 0);
    }
}
