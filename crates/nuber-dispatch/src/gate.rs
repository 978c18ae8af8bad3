//! Per-region admission gate

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use nuber_core::{BookingLabel, Event, EventSink};

use crate::cancel::Interrupt;
use crate::error::Interrupted;

/// Counting throttle with a fixed number of units
///
/// Units are minted on first use, up to `capacity`, and circulate through a
/// channel afterwards; holding a [`Permit`] means holding one unit, so at
/// most `capacity` permits can be out at any time. Only units that were
/// actually needed ever exist.
pub(crate) struct AdmissionGate {
    region: Arc<str>,
    capacity: usize,
    /// units handed out so far, never more than `capacity`
    minted: AtomicUsize,
    release: Sender<()>,
    units: Receiver<()>,
    sink: Arc<dyn EventSink>,
}

impl AdmissionGate {
    pub fn new(region: Arc<str>, capacity: usize, sink: Arc<dyn EventSink>) -> Self {
        let (release, units) = unbounded();
        Self {
            region,
            capacity,
            minted: AtomicUsize::new(0),
            release,
            units,
            sink,
        }
    }

    fn mint(&self) -> bool {
        self.minted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    /// Wait for a free unit
    pub fn acquire(
        &self,
        label: BookingLabel,
        interrupt: &Interrupt,
    ) -> Result<Permit<'_>, Interrupted> {
        interrupt.check()?;
        if self.units.try_recv().is_err() && !self.mint() {
            interrupt.recv(&self.units)?;
        }
        self.sink.log_event(
            Some(&label),
            &Event::SlotAcquired {
                region: self.region.clone(),
            },
        );
        Ok(Permit { gate: self, label })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of units currently held
    pub fn in_use(&self) -> usize {
        self.minted
            .load(Ordering::Acquire)
            .saturating_sub(self.units.len())
    }
}

/// One held unit of an [`AdmissionGate`], given back when dropped
pub(crate) struct Permit<'a> {
    gate: &'a AdmissionGate,
    label: BookingLabel,
}

impl Permit<'_> {
    /// Keep the label in sync with the booking for the release event
    pub fn relabel(&mut self, label: BookingLabel) {
        self.label = label;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        // logged before the unit is back so observers never count more holders than exist
        self.gate.sink.log_event(
            Some(&self.label),
            &Event::SlotReleased {
                region: self.gate.region.clone(),
            },
        );
        let _ = self.gate.release.send(());
    }
}
