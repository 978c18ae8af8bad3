//! Implementation of the dispatcher
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use nuber_core::{Config, Driver, Event, EventSink, Passenger, TripTimer};

use crate::booking::{Booking, BookingHandle};
use crate::cancel::{CancelToken, Interrupt};
use crate::driver_pool::DriverPool;
use crate::error::{LaunchError, Rejected};
use crate::region::Region;
use crate::workers::WorkerPool;

/// State shared between the dispatcher and its bookings
pub(crate) struct DispatchCore {
    pub pool: DriverPool,
    /// bookings created that have not been assigned a driver yet
    pub awaiting: Arc<AtomicUsize>,
    /// fired by [`Dispatcher::abort`], interrupts every booking
    pub abort: CancelToken,
    pub sink: Arc<dyn EventSink>,
    pub timer: Arc<dyn TripTimer>,
}

/// Entry point of the dispatch system
///
/// Owns the driver pool and the regions. All methods may be called
/// concurrently from different threads.
pub struct Dispatcher {
    core: Arc<DispatchCore>,
    regions: HashMap<String, Region>,
    workers: Arc<WorkerPool>,
    next_booking_id: AtomicU64,
    shutting_down: AtomicBool,
    drain_timeout: std::time::Duration,
}

impl Dispatcher {
    /// Create the [`Dispatcher`] and one region per configured entry
    pub fn new(
        config: &Config,
        timer: Arc<dyn TripTimer>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, LaunchError> {
        if config.regions.is_empty() {
            return Err(LaunchError::NoRegions);
        }
        if config.max_drivers == 0 {
            return Err(LaunchError::ZeroDriverCapacity);
        }
        if let Some((name, _)) = config.regions.iter().find(|(_, cap)| **cap == 0) {
            return Err(LaunchError::ZeroCapacity(name.clone()));
        }

        let workers = Arc::new(WorkerPool::new(config.worker_keep_alive));
        let mut regions = HashMap::with_capacity(config.regions.len());
        for (name, capacity) in &config.regions {
            let region = Region::new(
                name,
                *capacity as usize,
                config.drain_timeout,
                workers.clone(),
                sink.clone(),
            )
            .map_err(|source| LaunchError::Spawn {
                region: name.clone(),
                source,
            })?;
            regions.insert(name.clone(), region);
        }

        let core = Arc::new(DispatchCore {
            pool: DriverPool::new(config.max_drivers),
            awaiting: Arc::new(AtomicUsize::new(0)),
            abort: CancelToken::new(),
            sink,
            timer,
        });

        Ok(Self {
            core,
            regions,
            workers,
            next_booking_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            drain_timeout: config.drain_timeout,
        })
    }

    /// Add an idle driver to the pool
    ///
    /// Returns `false` if the pool is full.
    pub fn add_driver(&self, driver: Driver) -> bool {
        let name = driver.name_arc();
        match self.core.pool.add(driver) {
            Ok(()) => {
                self.log(Event::DriverAdded { driver: name });
                true
            }
            Err(_) => {
                self.log(Event::DriverRefused { driver: name });
                false
            }
        }
    }

    /// Wait for an idle driver and take it out of the pool
    ///
    /// The driver does not count toward any booking. Returns [`None`] if
    /// the dispatcher was aborted while waiting.
    pub fn get_driver(&self) -> Option<Driver> {
        let interrupt = Interrupt::new(CancelToken::new(), self.core.abort.clone());
        self.core.pool.take(&interrupt).ok()
    }

    /// Book `passenger` into the region called `region`
    ///
    /// Returns [`None`] if the booking was rejected; see [`Self::try_book`]
    /// for the reason.
    pub fn book(&self, passenger: Passenger, region: &str) -> Option<BookingHandle> {
        self.try_book(passenger, region).ok()
    }

    /// Book `passenger` into the region called `region`
    ///
    /// The booking counts as awaiting a driver until it gets one or ends
    /// without one, including when the region turns it away.
    pub fn try_book(&self, passenger: Passenger, region: &str) -> Result<BookingHandle, Rejected> {
        if self.shutting_down.load(Ordering::Acquire) {
            self.log(Event::DispatcherClosed);
            return Err(Rejected::DispatcherShuttingDown);
        }
        let Some(target) = self.regions.get(region) else {
            self.log(Event::UnknownRegion {
                region: region.to_owned(),
            });
            return Err(Rejected::UnknownRegion(region.to_owned()));
        };

        let id = self.next_booking_id.fetch_add(1, Ordering::Relaxed);
        let booking = Booking::new(self.core.clone(), id, passenger);
        target.submit(booking)
    }

    /// Number of bookings, across all regions, still waiting for a driver
    pub fn bookings_awaiting_driver(&self) -> usize {
        self.core.awaiting.load(Ordering::Acquire)
    }

    /// Number of drivers idle in the pool
    pub fn idle_drivers(&self) -> usize {
        self.core.pool.idle()
    }

    /// Look up a region by name
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    /// Iterate over all regions
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop accepting bookings and let admitted ones finish
    ///
    /// Waits up to the configured drain timeout, shared by all regions, and
    /// never cancels running bookings. Returns the names of the regions that
    /// still had bookings in flight when the wait ended.
    pub fn shutdown(&self) -> Vec<String> {
        self.shutting_down.store(true, Ordering::Release);
        for region in self.regions.values() {
            region.close();
        }

        let deadline = Instant::now() + self.drain_timeout;
        let mut undrained: Vec<String> = self
            .regions
            .values()
            .filter(|region| !region.drain_until(deadline))
            .map(|region| region.name().to_owned())
            .collect();
        undrained.sort();

        self.workers.shutdown();
        undrained
    }

    /// Interrupt every booking that is still running or waiting
    ///
    /// Interrupted bookings give back their driver and slot and resolve to
    /// [`None`]. Combine with [`Self::shutdown`] to unblock bookings stuck
    /// waiting for a driver that never comes.
    pub fn abort(&self) {
        if self.core.abort.cancel() {
            tracing::info!("dispatch aborted");
        }
    }

    fn log(&self, event: Event) {
        self.core.sink.log_event(None, &event);
    }
}
