//! Diagnostic events emitted while bookings move through the system

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifies the booking an event belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingLabel {
    /// Sequence number of the booking (for tracing only)
    pub id: u64,
    /// Name of the booked passenger
    pub passenger: Arc<str>,
    /// Name of the driver, once one has been assigned
    pub driver: Option<Arc<str>>,
}

impl fmt::Display for BookingLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let driver = self.driver.as_deref().unwrap_or("null");
        write!(f, "{}:{}:{}", self.id, driver, self.passenger)
    }
}

/// Something worth telling the operator about
///
/// The [`Display`](fmt::Display) form is the human-readable message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A driver joined the idle pool
    DriverAdded {
        /// name of the driver
        driver: Arc<str>,
    },
    /// A driver could not join because the pool is full
    DriverRefused {
        /// name of the driver
        driver: Arc<str>,
    },
    /// A region accepted a booking and queued it
    BookingReceived {
        /// region the booking was submitted to
        region: Arc<str>,
    },
    /// The dispatcher is shutting down and refused a booking
    DispatcherClosed,
    /// A region is shutting down and refused a booking
    RegionClosed {
        /// the closed region
        region: Arc<str>,
    },
    /// No region with that name exists
    UnknownRegion {
        /// the name that was asked for
        region: String,
    },
    /// A booking obtained one of its region's admission slots
    SlotAcquired {
        /// region owning the slot
        region: Arc<str>,
    },
    /// A booking gave its admission slot back
    SlotReleased {
        /// region owning the slot
        region: Arc<str>,
    },
    /// A driver left the pool to serve a booking
    DriverAssigned {
        /// name of the driver
        driver: Arc<str>,
    },
    /// The driver is on the way to the passenger
    PickupStarted,
    /// The passenger is on board and the drive began
    TripStarted,
    /// The passenger arrived
    TripCompleted {
        /// time from pickup start to arrival
        elapsed: Duration,
    },
    /// A driver went back to the pool
    DriverReleased {
        /// name of the driver
        driver: Arc<str>,
    },
    /// A booking was cancelled before it finished
    Interrupted {
        /// what the booking was doing when it was cancelled
        stage: &'static str,
    },
    /// A region stopped accepting bookings
    RegionShuttingDown {
        /// the region
        region: Arc<str>,
    },
    /// All bookings admitted to a region have finished
    RegionDrained {
        /// the region
        region: Arc<str>,
    },
    /// A region still had bookings in flight when the drain bound expired
    DrainTimedOut {
        /// the region
        region: Arc<str>,
        /// bookings still admitted when the bound expired
        in_flight: usize,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::DriverAdded { driver } => write!(f, "{driver} added to driver pool"),
            Event::DriverRefused { driver } => {
                write!(f, "{driver} refused: driver pool is full")
            }
            Event::BookingReceived { region } => write!(
                f,
                "booking received in region {region}, awaiting an available slot"
            ),
            Event::DispatcherClosed => write!(f, "booking rejected: dispatch is shutting down"),
            Event::RegionClosed { region } => {
                write!(f, "booking rejected: region {region} is shutting down")
            }
            Event::UnknownRegion { region } => {
                write!(f, "booking rejected: no region named {region}")
            }
            Event::SlotAcquired { region } => write!(f, "slot acquired in region {region}"),
            Event::SlotReleased { region } => write!(f, "slot released in region {region}"),
            Event::DriverAssigned { driver } => write!(f, "{driver} assigned"),
            Event::PickupStarted => write!(f, "starting, on way to passenger"),
            Event::TripStarted => write!(f, "collected passenger, on way to destination"),
            Event::TripCompleted { elapsed } => write!(
                f,
                "at destination after {}ms, driver is now free",
                elapsed.as_millis()
            ),
            Event::DriverReleased { driver } => write!(f, "{driver} returned to driver pool"),
            Event::Interrupted { stage } => write!(f, "interrupted while {stage}"),
            Event::RegionShuttingDown { region } => {
                write!(f, "region {region} is shutting down")
            }
            Event::RegionDrained { region } => write!(f, "region {region} drained"),
            Event::DrainTimedOut { region, in_flight } => write!(
                f,
                "region {region} stopped waiting with {in_flight} booking(s) in flight"
            ),
        }
    }
}

/// Receiver of diagnostic events
///
/// This method may be called concurrently from different threads.
pub trait EventSink: Send + Sync {
    /// Record `event`, caused by `booking` if there is one
    fn log_event(&self, booking: Option<&BookingLabel>, event: &Event);
}

/// Writes events to stdout when enabled and always to `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink {
    enabled: bool,
}

impl ConsoleSink {
    /// Create a [`ConsoleSink`]; `enabled` controls the stdout lines
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl EventSink for ConsoleSink {
    fn log_event(&self, booking: Option<&BookingLabel>, event: &Event) {
        match booking {
            Some(label) => tracing::debug!(booking = %label, "{event}"),
            None => tracing::debug!("{event}"),
        }
        if !self.enabled {
            return;
        }
        match booking {
            Some(label) => println!("{label}: {event}"),
            None => println!("null: {event}"),
        }
    }
}
