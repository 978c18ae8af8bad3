use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::timer::saturating_millis;

/// A passenger waiting to be driven somewhere
///
/// The travel time is fixed when the passenger is created and never changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Passenger {
    name: Arc<str>,
    travel_time: Duration,
}

impl Passenger {
    /// Create a passenger whose journey takes exactly `travel_time`
    pub fn new(name: impl Into<Arc<str>>, travel_time: Duration) -> Self {
        Self {
            name: name.into(),
            travel_time,
        }
    }

    /// Create a passenger with a travel time drawn uniformly from `0..=max_travel`
    pub fn random(name: impl Into<Arc<str>>, max_travel: Duration) -> Self {
        let millis = saturating_millis(max_travel);
        let travel = rand::thread_rng().gen_range(0..=millis);
        Self::new(name, Duration::from_millis(travel))
    }

    /// The passenger's name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long the drive to the destination takes
    #[inline]
    pub fn travel_time(&self) -> Duration {
        self.travel_time
    }
}

impl fmt::Display for Passenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A driver that is either idle in the pool or busy with one booking
#[derive(Debug)]
pub struct Driver {
    name: Arc<str>,
    /// the passenger currently riding
    current_passenger: Option<Arc<Passenger>>,
}

impl Driver {
    /// Create an idle driver
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            current_passenger: None,
        }
    }

    /// The driver's name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the driver's name
    #[inline]
    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Take `passenger` on board
    ///
    /// The caller is responsible for waiting out the pickup time.
    pub fn pick_up(&mut self, passenger: Arc<Passenger>) {
        self.current_passenger = Some(passenger);
    }

    /// Start the drive to the current passenger's destination
    ///
    /// Returns the travel time the caller has to wait out, or [`None`] if
    /// nobody is on board.
    pub fn drive_to_destination(&self) -> Option<Duration> {
        self.current_passenger.as_ref().map(|p| p.travel_time())
    }

    /// Let the passenger out, making the driver idle again
    pub fn drop_off(&mut self) -> Option<Arc<Passenger>> {
        self.current_passenger.take()
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_travel_stays_within_bound() {
        let max = Duration::from_millis(20);
        for _ in 0..50 {
            assert!(Passenger::random("P", max).travel_time() <= max);
        }
        // larger than u64::MAX milliseconds
        let huge = Passenger::random("P", Duration::MAX);
        assert!(huge.travel_time() <= Duration::MAX);
    }

    #[test]
    fn driver_carries_one_passenger_at_a_time() {
        let mut driver = Driver::new("D");
        assert_eq!(driver.drive_to_destination(), None);

        let passenger = Arc::new(Passenger::new("P", Duration::from_millis(7)));
        driver.pick_up(passenger.clone());
        assert_eq!(driver.drive_to_destination(), Some(Duration::from_millis(7)));
        assert_eq!(driver.drop_off(), Some(passenger));
        assert_eq!(driver.drop_off(), None);
    }
}
