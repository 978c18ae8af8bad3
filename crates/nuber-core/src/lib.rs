//! 🏗 Shared building blocks for the dispatch system: people, trip timing,
//! events, and configuration.
#![warn(missing_docs)]

mod event;
mod person;
mod timer;

use std::collections::HashMap;
use std::time::Duration;

pub use event::{BookingLabel, ConsoleSink, Event, EventSink};
pub use person::{Driver, Passenger};
pub use timer::{FixedTimer, RandomTimer, TripTimer};

/// Maximum number of idle drivers the pool holds unless configured otherwise
pub const DEFAULT_MAX_DRIVERS: usize = 999;

/// Configuration of the dispatch system
#[derive(Clone, Debug)]
pub struct Config {
    /// Region names mapped to the number of bookings each region may run at
    /// the same time
    pub regions: HashMap<String, u32>,
    /// Print human-readable event lines to stdout
    pub log_events: bool,
    /// Capacity of the shared driver pool
    pub max_drivers: usize,
    /// Upper bound a region waits for admitted bookings when shutting down
    pub drain_timeout: Duration,
    /// Time an idle worker thread waits for new work before it exits
    pub worker_keep_alive: Duration,
    /// Longest time a driver may take to reach a passenger
    pub max_pickup: Duration,
}

impl Config {
    /// Create a configuration for the given regions with default limits
    pub fn new<I, S>(regions: I, log_events: bool) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            regions: regions
                .into_iter()
                .map(|(name, cap)| (name.into(), cap))
                .collect(),
            log_events,
            max_drivers: DEFAULT_MAX_DRIVERS,
            drain_timeout: Duration::from_secs(10),
            worker_keep_alive: Duration::from_secs(60),
            max_pickup: Duration::from_millis(100),
        }
    }

    /// Set the capacity of the driver pool
    pub fn with_max_drivers(mut self, max_drivers: usize) -> Self {
        self.max_drivers = max_drivers;
        self
    }

    /// Set the bound on the shutdown drain
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the longest pickup time used by [`RandomTimer`]
    pub fn with_max_pickup(mut self, max_pickup: Duration) -> Self {
        self.max_pickup = max_pickup;
        self
    }

    /// Set how long idle worker threads linger
    pub fn with_worker_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.worker_keep_alive = keep_alive;
        self
    }
}
