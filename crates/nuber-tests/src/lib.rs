use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Result};
use nuber_core::{Config, Driver, FixedTimer, Passenger};
use nuber_dispatch::{BookingHandle, BookingResult, Dispatcher};

mod recorder;
pub use recorder::RecordingSink;

pub struct TestCtxBuilder {
    /// Region names and capacities
    pub regions: Vec<(String, u32)>,
    /// Drivers added before the context is handed out
    pub drivers: u32,
    /// Capacity of the driver pool
    pub max_drivers: usize,
    /// Pickup time of every trip
    pub pickup_time: Duration,
    /// Bound on the shutdown drain
    pub drain_timeout: Duration,
    /// Whether to print event lines (default: `NUBER_LOG_EVENTS`)
    pub log_events: bool,
}

impl TestCtxBuilder {
    /// Create a new test context builder initialized with environment defaults
    pub fn from_env() -> Result<Self> {
        let log_events = match std::env::var("NUBER_LOG_EVENTS") {
            Ok(v) => v != "0" && !v.eq_ignore_ascii_case("false"),
            Err(std::env::VarError::NotPresent) => false,
            Err(e) => return Err(eyre!("NUBER_LOG_EVENTS: {e}")),
        };

        Ok(TestCtxBuilder {
            regions: Vec::new(),
            drivers: 0,
            max_drivers: nuber_core::DEFAULT_MAX_DRIVERS,
            pickup_time: Duration::from_millis(5),
            drain_timeout: Duration::from_secs(10),
            log_events,
        })
    }

    /// Add a region
    pub fn with_region(mut self, name: &str, capacity: u32) -> Self {
        self.regions.push((name.to_owned(), capacity));
        self
    }

    /// Set the number of drivers added up front
    pub fn with_drivers(mut self, drivers: u32) -> Self {
        self.drivers = drivers;
        self
    }

    /// Set the capacity of the driver pool
    pub fn with_max_drivers(mut self, max_drivers: usize) -> Self {
        self.max_drivers = max_drivers;
        self
    }

    /// Set the pickup time of every trip
    pub fn with_pickup_time(mut self, pickup_time: Duration) -> Self {
        self.pickup_time = pickup_time;
        self
    }

    /// Set the bound on the shutdown drain
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    fn config(&self) -> Config {
        Config::new(self.regions.clone(), self.log_events)
            .with_max_drivers(self.max_drivers)
            .with_drain_timeout(self.drain_timeout)
            .with_worker_keep_alive(Duration::from_secs(1))
    }

    /// Build the test context
    pub async fn build(self) -> Result<TestCtx> {
        let config = self.config();
        let events = Arc::new(RecordingSink::new(self.log_events));
        let sink = events.clone();
        let timer = Arc::new(FixedTimer(self.pickup_time));
        let dispatcher =
            tokio::task::spawn_blocking(move || Dispatcher::new(&config, timer, sink)).await??;

        let ctx = TestCtx {
            dispatcher: Arc::new(dispatcher),
            events,
            drop_bomb: DropBomb,
        };
        for i in 0..self.drivers {
            if !ctx.add_driver(&format!("D-{i}")) {
                return Err(eyre!("driver D-{i} did not fit into the pool"));
            }
        }
        Ok(ctx)
    }
}

/// Test context
pub struct TestCtx {
    /// The system under test
    pub dispatcher: Arc<Dispatcher>,
    /// Everything the system reported
    pub events: Arc<RecordingSink>,

    drop_bomb: DropBomb,
}

impl TestCtx {
    /// Add a driver named `name`
    pub fn add_driver(&self, name: &str) -> bool {
        self.dispatcher.add_driver(Driver::new(name))
    }

    /// Book a passenger whose drive takes `travel`
    pub fn book(&self, name: &str, travel: Duration, region: &str) -> Option<PendingBooking> {
        self.dispatcher
            .book(Passenger::new(name, travel), region)
            .map(|handle| PendingBooking { handle })
    }

    /// Shut the dispatcher down without ending the test
    pub async fn shutdown(&self) -> Result<Vec<String>> {
        let dispatcher = self.dispatcher.clone();
        Ok(tokio::task::spawn_blocking(move || dispatcher.shutdown()).await?)
    }

    /// Shut the dispatch system down and finish the test
    pub async fn finish(self) {
        std::mem::forget(self.drop_bomb);
        let dispatcher = self.dispatcher;
        tokio::task::spawn_blocking(move || {
            let undrained = dispatcher.shutdown();
            if !undrained.is_empty() {
                tracing::debug!(?undrained, "aborting bookings left over by the test");
                dispatcher.abort();
            }
        })
        .await
        .unwrap();
    }
}

/// An accepted booking whose result has not been collected yet
#[derive(Debug)]
pub struct PendingBooking {
    handle: BookingHandle,
}

impl PendingBooking {
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// Wait for the booking to finish
    pub async fn result(self) -> Result<Option<BookingResult>> {
        Ok(tokio::task::spawn_blocking(move || self.handle.wait()).await?)
    }

    /// Wait at most `timeout`; hands the booking back if it is still going
    pub async fn result_within(
        self,
        timeout: Duration,
    ) -> Result<std::result::Result<Option<BookingResult>, PendingBooking>> {
        let waited =
            tokio::task::spawn_blocking(move || self.handle.wait_timeout(timeout)).await?;
        Ok(waited.map_err(|handle| PendingBooking { handle }))
    }
}

struct DropBomb;

impl Drop for DropBomb {
    fn drop(&mut self) {
        eprintln!("@TestAuthor: You should call `ctx.finish().await` to shut the dispatch system down");
    }
}
