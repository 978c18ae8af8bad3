//! Implementation of a region
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use nuber_core::{Event, EventSink};
use parking_lot::{Condvar, Mutex};

use crate::booking::{Booking, BookingHandle, ResultSlot};
use crate::error::{Interrupted, Rejected};
use crate::gate::AdmissionGate;
use crate::workers::WorkerPool;

/// Lifecycle of a region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionPhase {
    /// Accepting bookings
    Active,
    /// Refusing new bookings, admitted ones still running
    ShuttingDown,
    /// Refusing new bookings, all admitted ones finished
    Drained,
}

/// An independently throttled region
///
/// Bookings are accepted right away and queued; each one then waits for one
/// of the region's `capacity` admission slots and for a driver from the
/// shared pool before the journey starts. Bookings finish in no particular
/// order.
pub struct Region {
    inner: Arc<RegionInner>,
    /// thread forwarding submissions to the worker pool
    lane: Mutex<Option<JoinHandle<()>>>,
    drain_timeout: Duration,
}

struct RegionInner {
    name: Arc<str>,
    gate: AdmissionGate,
    state: Mutex<RegionState>,
    /// signalled whenever `in_flight` drops to zero
    drained: Condvar,
    sink: Arc<dyn EventSink>,
}

struct RegionState {
    phase: RegionPhase,
    /// admitted bookings that have not finished yet
    in_flight: usize,
    /// submission lane, `None` once shutting down
    lane: Option<Sender<Submission>>,
}

/// An accepted booking on its way to a worker
struct Submission {
    booking: Booking,
    slot: ResultSlot,
    _in_flight: InFlight,
}

/// Counts a submission as in flight until dropped
struct InFlight(Arc<RegionInner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let inner = &self.0;
        let mut state = inner.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            inner.drained.notify_all();
            if state.phase == RegionPhase::ShuttingDown {
                state.phase = RegionPhase::Drained;
                drop(state);
                inner.sink.log_event(
                    None,
                    &Event::RegionDrained {
                        region: inner.name.clone(),
                    },
                );
            }
        }
    }
}

impl Region {
    /// Create a [`Region`] and start its submission lane
    pub(crate) fn new(
        name: &str,
        capacity: usize,
        drain_timeout: Duration,
        workers: Arc<WorkerPool>,
        sink: Arc<dyn EventSink>,
    ) -> std::io::Result<Self> {
        let name: Arc<str> = name.into();
        let (sender, receiver) = unbounded();
        let inner = Arc::new(RegionInner {
            gate: AdmissionGate::new(name.clone(), capacity, sink.clone()),
            name: name.clone(),
            state: Mutex::new(RegionState {
                phase: RegionPhase::Active,
                in_flight: 0,
                lane: Some(sender),
            }),
            drained: Condvar::new(),
            sink,
        });

        let lane_inner = inner.clone();
        let lane = thread::Builder::new()
            .name(format!("region-{name}"))
            .spawn(move || intake(lane_inner, receiver, workers))?;

        Ok(Self {
            inner,
            lane: Mutex::new(Some(lane)),
            drain_timeout,
        })
    }

    /// The region's name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Maximum number of bookings running at the same time
    pub fn capacity(&self) -> usize {
        self.inner.gate.capacity()
    }

    /// Number of bookings currently holding an admission slot
    pub fn active_jobs(&self) -> usize {
        self.inner.gate.in_use()
    }

    /// Number of admitted bookings that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    pub fn phase(&self) -> RegionPhase {
        self.inner.state.lock().phase
    }

    /// Queue `booking` for execution
    ///
    /// Never waits for a slot or a driver; that happens on a worker. Rejects
    /// the booking once the region is shutting down.
    pub fn submit(&self, booking: Booking) -> Result<BookingHandle, Rejected> {
        let mut state = self.inner.state.lock();
        let lane = match state.phase {
            RegionPhase::Active => state.lane.clone(),
            _ => None,
        };
        let Some(lane) = lane else {
            drop(state);
            booking.log(Event::RegionClosed {
                region: self.inner.name.clone(),
            });
            return Err(Rejected::RegionShuttingDown(self.name().to_owned()));
        };
        state.in_flight += 1;
        drop(state);

        let (result_sender, result_receiver) = bounded(1);
        let handle = BookingHandle::new(booking.id(), result_receiver, booking.cancel_token());
        booking.log(Event::BookingReceived {
            region: self.inner.name.clone(),
        });

        let submission = Submission {
            booking,
            slot: ResultSlot::new(result_sender),
            _in_flight: InFlight(self.inner.clone()),
        };
        if lane.send(submission).is_err() {
            tracing::error!(region = %self.inner.name, "submission lane is gone");
        }
        Ok(handle)
    }

    /// Stop accepting bookings
    ///
    /// Returns `false` if the region was already shutting down.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase != RegionPhase::Active {
            return false;
        }
        let idle = state.in_flight == 0;
        state.phase = if idle {
            RegionPhase::Drained
        } else {
            RegionPhase::ShuttingDown
        };
        // the lane thread exits once it has forwarded what is queued
        state.lane = None;
        drop(state);

        let region = self.inner.name.clone();
        self.inner.sink.log_event(
            None,
            &Event::RegionShuttingDown {
                region: region.clone(),
            },
        );
        if idle {
            self.inner
                .sink
                .log_event(None, &Event::RegionDrained { region });
        }
        true
    }

    /// Wait until every admitted booking has finished or `deadline` passed
    ///
    /// Running bookings are never cancelled. Returns whether the region
    /// drained in time.
    pub(crate) fn drain_until(&self, deadline: Instant) -> bool {
        let mut state = self.inner.state.lock();
        while state.in_flight > 0 {
            if self
                .inner
                .drained
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        let in_flight = state.in_flight;
        drop(state);

        if in_flight > 0 {
            self.inner.sink.log_event(
                None,
                &Event::DrainTimedOut {
                    region: self.inner.name.clone(),
                    in_flight,
                },
            );
            tracing::warn!(region = %self.inner.name, in_flight, "drain bound expired");
            return false;
        }

        // nothing is queued any more, so the lane is about to exit
        if let Some(lane) = self.lane.lock().take() {
            if lane.join().is_err() {
                tracing::error!(region = %self.inner.name, "submission lane panicked");
            }
        }
        true
    }

    /// Stop accepting bookings and wait a bounded time for admitted ones
    ///
    /// Returns whether everything admitted finished within the bound.
    pub fn shutdown(&self) -> bool {
        self.close();
        self.drain_until(Instant::now() + self.drain_timeout)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        self.inner.state.lock().lane = None;
    }
}

/// main lane loop: hand every submission to a worker, one at a time
fn intake(inner: Arc<RegionInner>, submissions: Receiver<Submission>, workers: Arc<WorkerPool>) {
    for submission in submissions {
        let region = inner.clone();
        let job = Box::new(move || execute(&region, submission));
        if workers.execute(job).is_err() {
            // dropping the job reports the booking as unfinished
            tracing::warn!(region = %inner.name, "worker pool closed, submission dropped");
        }
    }
    tracing::debug!(region = %inner.name, "submission lane closed");
}

/// Run one admitted booking inside an admission slot
fn execute(inner: &RegionInner, submission: Submission) {
    let Submission {
        mut booking,
        slot,
        _in_flight,
    } = submission;

    let result = match inner.gate.acquire(booking.label(), booking.interrupt()) {
        Ok(mut permit) => {
            let result = booking.run();
            permit.relabel(booking.label());
            result
        }
        Err(Interrupted) => {
            booking.abandon("waiting for a slot");
            None
        }
    };
    slot.deliver(result);
}
