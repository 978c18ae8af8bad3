//! 🚕 Matching passengers to a shared pool of drivers across independently
//! throttled regions.
//!
//! The [`Dispatcher`] owns the [driver pool][DriverPool] and the
//! [regions][Region]. Every booked passenger becomes a [`Booking`] that
//! waits for an admission slot in its region and for a driver, runs its
//! journey on a worker thread, and resolves its [`BookingHandle`].

use std::sync::Arc;

use nuber_core::{Config, ConsoleSink, RandomTimer};

mod booking;
mod cancel;
mod dispatcher;
mod driver_pool;
mod error;
mod gate;
mod region;
mod workers;

pub use booking::{Booking, BookingHandle, BookingResult};
pub use cancel::{CancelToken, Interrupt};
pub use dispatcher::Dispatcher;
pub use driver_pool::DriverPool;
pub use error::{Interrupted, LaunchError, Rejected};
pub use region::{Region, RegionPhase};

/// Start a dispatcher with random pickup times and console event logging
pub fn launch(config: &Config) -> Result<Dispatcher, LaunchError> {
    Dispatcher::new(
        config,
        Arc::new(RandomTimer::new(config.max_pickup)),
        Arc::new(ConsoleSink::new(config.log_events)),
    )
}
