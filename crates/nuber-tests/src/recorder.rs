//! Event sink that keeps score of slot and driver holders

use std::collections::HashMap;
use std::sync::Arc;

use nuber_core::{BookingLabel, ConsoleSink, Event, EventSink};
use parking_lot::Mutex;

#[derive(Default)]
struct Tally {
    /// current and maximum slot holders per region
    slots: HashMap<Arc<str>, (usize, usize)>,
    /// current and maximum bookings per driver
    drivers: HashMap<Arc<str>, (usize, usize)>,
    events: Vec<(Option<u64>, Event)>,
}

fn raise(entry: &mut (usize, usize)) {
    entry.0 += 1;
    entry.1 = entry.1.max(entry.0);
}

fn lower(entry: &mut (usize, usize)) {
    assert!(entry.0 > 0, "released more than was acquired");
    entry.0 -= 1;
}

/// Records every event in order and tracks concurrent holders
pub struct RecordingSink {
    tally: Mutex<Tally>,
    console: ConsoleSink,
}

impl RecordingSink {
    pub fn new(log_events: bool) -> Self {
        Self {
            tally: Mutex::new(Tally::default()),
            console: ConsoleSink::new(log_events),
        }
    }

    /// Most bookings ever seen holding a slot in `region` at the same time
    pub fn max_active(&self, region: &str) -> usize {
        self.tally.lock().slots.get(region).map_or(0, |e| e.1)
    }

    /// Most bookings ever seen holding the same driver at the same time
    pub fn max_driver_holders(&self) -> usize {
        self.tally
            .lock()
            .drivers
            .values()
            .map(|e| e.1)
            .max()
            .unwrap_or(0)
    }

    /// Number of drivers that served at least one booking
    pub fn drivers_used(&self) -> usize {
        self.tally.lock().drivers.len()
    }

    /// All events so far, tagged with the booking id if there was one
    pub fn events(&self) -> Vec<(Option<u64>, Event)> {
        self.tally.lock().events.clone()
    }

    /// Count the events matching `pred`
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.tally.lock().events.iter().filter(|(_, e)| pred(e)).count()
    }

    /// Whether booking `id` produced an event matching `pred`
    pub fn saw(&self, id: u64, pred: impl Fn(&Event) -> bool) -> bool {
        self.tally
            .lock()
            .events
            .iter()
            .any(|(b, e)| *b == Some(id) && pred(e))
    }
}

impl EventSink for RecordingSink {
    fn log_event(&self, booking: Option<&BookingLabel>, event: &Event) {
        self.console.log_event(booking, event);

        let mut tally = self.tally.lock();
        match event {
            Event::SlotAcquired { region } => {
                raise(tally.slots.entry(region.clone()).or_default());
            }
            Event::SlotReleased { region } => {
                lower(tally.slots.entry(region.clone()).or_default());
            }
            Event::DriverAssigned { driver } => {
                raise(tally.drivers.entry(driver.clone()).or_default());
            }
            Event::DriverReleased { driver } => {
                lower(tally.drivers.entry(driver.clone()).or_default());
            }
            _ => {}
        }
        tally.events.push((booking.map(|b| b.id), event.clone()));
    }
}
