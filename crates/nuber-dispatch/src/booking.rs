//! Implementation of a single booking and the handle its caller waits on

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use nuber_core::{BookingLabel, Driver, Event, Passenger};

use crate::cancel::{CancelToken, Interrupt};
use crate::dispatcher::DispatchCore;
use crate::driver_pool::DriverPool;
use crate::error::Interrupted;

/// The outcome of a completed journey
#[derive(Clone, Debug)]
pub struct BookingResult {
    /// Sequence number of the booking
    pub booking_id: u64,
    /// Who was driven
    pub passenger: Arc<Passenger>,
    /// Who drove
    pub driver: Arc<str>,
    /// Wall-clock time of pickup plus drive
    pub trip_duration: Duration,
}

/// One passenger's journey, from waiting for a driver to arrival
///
/// A booking is created by the dispatcher for every accepted request and is
/// run at most once.
pub struct Booking {
    id: u64,
    passenger: Arc<Passenger>,
    /// name of the assigned driver, for labelling events
    driver: Option<Arc<str>>,
    core: Arc<DispatchCore>,
    /// held until a driver has been assigned
    ticket: Option<WaitingTicket>,
    cancel: CancelToken,
    interrupt: Interrupt,
}

impl Booking {
    pub(crate) fn new(core: Arc<DispatchCore>, id: u64, passenger: Passenger) -> Self {
        let ticket = WaitingTicket::issue(core.awaiting.clone());
        let cancel = CancelToken::new();
        let interrupt = Interrupt::new(cancel.clone(), core.abort.clone());
        Self {
            id,
            passenger: Arc::new(passenger),
            driver: None,
            core,
            ticket: Some(ticket),
            cancel,
            interrupt,
        }
    }

    /// Sequence number of the booking
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> BookingLabel {
        BookingLabel {
            id: self.id,
            passenger: self.passenger.name().into(),
            driver: self.driver.clone(),
        }
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub(crate) fn log(&self, event: Event) {
        self.core.sink.log_event(Some(&self.label()), &event);
    }

    /// Get a driver, drive the passenger, and give the driver back
    ///
    /// Returns [`None`] if the booking was interrupted along the way; the
    /// driver is back in the pool either way.
    pub(crate) fn run(&mut self) -> Option<BookingResult> {
        let driver = match self.core.pool.check_out(&self.interrupt) {
            Ok(driver) => driver,
            Err(Interrupted) => {
                self.log(Event::Interrupted {
                    stage: "waiting for a driver",
                });
                self.ticket.take();
                return None;
            }
        };
        // no longer waiting for a driver
        self.ticket.take();
        self.driver = Some(driver.name_arc());
        self.log(Event::DriverAssigned {
            driver: driver.name_arc(),
        });

        let mut lease = DriverLease {
            pool: &self.core.pool,
            driver: Some(driver),
            booking: self,
        };
        let start = Instant::now();
        let outcome = lease.journey();
        drop(lease);

        match outcome {
            Ok(()) => {
                let trip_duration = start.elapsed();
                self.log(Event::TripCompleted {
                    elapsed: trip_duration,
                });
                Some(BookingResult {
                    booking_id: self.id,
                    passenger: self.passenger.clone(),
                    driver: self.driver.clone()?,
                    trip_duration,
                })
            }
            Err(stage) => {
                self.log(Event::Interrupted { stage });
                None
            }
        }
    }

    /// Report that the booking ended without running
    pub(crate) fn abandon(&mut self, stage: &'static str) {
        self.log(Event::Interrupted { stage });
        self.ticket.take();
    }
}

impl fmt::Display for Booking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.label().fmt(f)
    }
}

impl fmt::Debug for Booking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Booking")
            .field("id", &self.id)
            .field("passenger", &self.passenger)
            .field("driver", &self.driver)
            .field("awaiting_driver", &self.ticket.is_some())
            .finish()
    }
}

/// A driver out on a trip; goes back to the pool when dropped
struct DriverLease<'a> {
    pool: &'a DriverPool,
    driver: Option<Driver>,
    booking: &'a Booking,
}

impl DriverLease<'_> {
    /// Pick the passenger up and drive them to the destination
    ///
    /// On interruption, returns the stage that was cut short.
    fn journey(&mut self) -> Result<(), &'static str> {
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };
        let booking = self.booking;
        let pickup = booking
            .core
            .timer
            .pickup_time(driver, &booking.passenger);

        booking.log(Event::PickupStarted);
        driver.pick_up(booking.passenger.clone());
        booking
            .interrupt
            .sleep(pickup)
            .map_err(|_| "picking up the passenger")?;

        booking.log(Event::TripStarted);
        if let Some(travel) = driver.drive_to_destination() {
            booking
                .interrupt
                .sleep(travel)
                .map_err(|_| "driving to the destination")?;
        }
        Ok(())
    }
}

impl Drop for DriverLease<'_> {
    fn drop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.drop_off();
            self.booking.log(Event::DriverReleased {
                driver: driver.name_arc(),
            });
            self.pool.give_back(driver);
        }
    }
}

/// Counts a booking as awaiting a driver for as long as it lives
///
/// Issuing increments the shared counter and dropping decrements it, so the
/// two always pair up no matter how the booking ends.
#[derive(Debug)]
pub(crate) struct WaitingTicket {
    counter: Arc<AtomicUsize>,
}

impl WaitingTicket {
    fn issue(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for WaitingTicket {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Sending half of a [`BookingHandle`]; reports [`None`] if dropped unused
pub(crate) struct ResultSlot(Option<Sender<Option<BookingResult>>>);

impl ResultSlot {
    pub fn new(sender: Sender<Option<BookingResult>>) -> Self {
        Self(Some(sender))
    }

    pub fn deliver(mut self, result: Option<BookingResult>) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(result);
        }
    }
}

impl Drop for ResultSlot {
    fn drop(&mut self) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(None);
        }
    }
}

/// Handle to the result of an accepted booking
///
/// Resolves to [`None`] if the booking was interrupted or could not run.
#[derive(Debug)]
pub struct BookingHandle {
    id: u64,
    result: Receiver<Option<BookingResult>>,
    cancel: CancelToken,
}

impl BookingHandle {
    pub(crate) fn new(
        id: u64,
        result: Receiver<Option<BookingResult>>,
        cancel: CancelToken,
    ) -> Self {
        Self { id, result, cancel }
    }

    /// Sequence number of the booking
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the booking has finished
    pub fn wait(self) -> Option<BookingResult> {
        self.result.recv().ok().flatten()
    }

    /// Block for at most `timeout`
    ///
    /// Hands the handle back if the booking is still going.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<BookingResult>, Self> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    /// Whether the result is ready to be collected without blocking
    pub fn is_finished(&self) -> bool {
        !self.result.is_empty()
    }

    /// Interrupt the booking
    ///
    /// The booking releases whatever driver and slot it holds and resolves
    /// to [`None`]. Returns `false` if it had already been cancelled. A
    /// booking that already finished is unaffected.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }
}
