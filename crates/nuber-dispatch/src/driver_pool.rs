//! Implementation of the shared pool of idle drivers

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::channel::{unbounded, Receiver, Sender};
use nuber_core::Driver;

use crate::cancel::Interrupt;
use crate::error::Interrupted;

/// Capacity-bounded collection of idle drivers, shared by all regions
///
/// Drivers travel through a channel, so taking one moves it out of the pool
/// and a driver can only ever be held by one booking at a time. The channel
/// itself is unbounded; `enrolled` is what keeps the pool within capacity.
pub struct DriverPool {
    sender: Sender<Driver>,
    receiver: Receiver<Driver>,
    capacity: usize,
    /// drivers that joined the pool, whether idle or out on a trip
    enrolled: AtomicUsize,
}

impl DriverPool {
    /// Create an empty [`DriverPool`]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            capacity,
            enrolled: AtomicUsize::new(0),
        }
    }

    /// Add a new idle driver
    ///
    /// Returns the driver back if the pool is full. Drivers out on a trip
    /// keep their place, so a returning driver always fits.
    pub fn add(&self, driver: Driver) -> Result<(), Driver> {
        let reserved = self
            .enrolled
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(driver);
        }
        self.sender.try_send(driver).map_err(|e| {
            self.enrolled.fetch_sub(1, Ordering::AcqRel);
            e.into_inner()
        })
    }

    /// Wait for an idle driver and remove it from the pool for good
    ///
    /// Waiting takers are not served in any particular order.
    pub fn take(&self, interrupt: &Interrupt) -> Result<Driver, Interrupted> {
        let driver = self.check_out(interrupt)?;
        self.enrolled.fetch_sub(1, Ordering::AcqRel);
        Ok(driver)
    }

    /// Wait for an idle driver that has to come back through
    /// [`Self::give_back`]; its place in the pool stays reserved meanwhile
    pub(crate) fn check_out(&self, interrupt: &Interrupt) -> Result<Driver, Interrupted> {
        interrupt.recv(&self.receiver)
    }

    /// Return a driver obtained from [`Self::check_out`]
    pub(crate) fn give_back(&self, driver: Driver) {
        // the receiver lives as long as the pool, so this cannot fail
        let _ = self.sender.send(driver);
    }

    /// Number of idle drivers
    pub fn idle(&self) -> usize {
        self.receiver.len()
    }
}
