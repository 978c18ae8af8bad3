//! Command line simulation of the dispatch system

#![warn(missing_docs)]

mod settings;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use eyre::Result;
use nuber_core::{Config, Driver, Passenger};
use nuber_dispatch::{BookingHandle, BookingResult, Dispatcher};
use settings::SimSettings;
use tracing_subscriber::{fmt, EnvFilter};

/// Command line options
#[derive(Debug)]
struct Opts {
    /// Settings file, searched for if not given
    config: Option<PathBuf>,
    /// Number of drivers added to the pool
    drivers: Option<u32>,
    /// Number of passengers booked
    passengers: Option<u32>,
    /// Longest pickup and travel time in milliseconds
    max_sleep: Option<u64>,
    /// Print event lines
    log: bool,
}

impl Opts {
    fn from_args() -> Self {
        let mut opts = Opts {
            config: None,
            drivers: None,
            passengers: None,
            max_sleep: None,
            log: false,
        };

        let mut option: Option<String> = None;
        for arg in std::env::args().skip(1) {
            if let Some(opt) = option {
                match opt.as_str() {
                    "-config" => opts.config = Some(arg.into()),
                    "-drivers" => {
                        opts.drivers = Some(arg.parse().expect("-drivers takes a decimal u32"))
                    }
                    "-passengers" => {
                        opts.passengers =
                            Some(arg.parse().expect("-passengers takes a decimal u32"))
                    }
                    "-max-sleep" => {
                        opts.max_sleep = Some(arg.parse().expect("-max-sleep takes a decimal u64"))
                    }
                    _ => {
                        eprintln!("Error: ignoring unknown option {opt}");
                        std::process::exit(1);
                    }
                }
                option = None;
            } else {
                match arg.as_str() {
                    "-log" => opts.log = true,
                    _ => option = Some(arg),
                }
            }
        }
        if let Some(opt) = option {
            eprintln!("Error: ignoring leftover option {opt}");
            std::process::exit(1);
        }

        opts
    }

    /// Combine the settings file with the command line, which takes precedence
    fn settings(&self) -> Result<SimSettings> {
        let mut settings = match &self.config {
            Some(path) => SimSettings::from_file(path.clone())?,
            None => SimSettings::discover()?,
        };
        if let Some(drivers) = self.drivers {
            settings.drivers = drivers;
        }
        if let Some(passengers) = self.passengers {
            settings.passengers = passengers;
        }
        if let Some(max_sleep) = self.max_sleep {
            settings.max_pickup_ms = max_sleep;
            settings.max_travel_ms = max_sleep;
        }
        settings.log_events |= self.log;
        Ok(settings)
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}

/// Add the drivers from several threads at once
fn add_drivers(dispatcher: &Dispatcher, count: u32) -> u32 {
    let adders = count.clamp(1, 4);
    thread::scope(|s| {
        let threads: Vec<_> = (0..adders)
            .map(|t| {
                s.spawn(move || {
                    (t..count)
                        .step_by(adders as usize)
                        .filter(|i| dispatcher.add_driver(Driver::new(format!("D-{i}"))))
                        .count() as u32
                })
            })
            .collect();
        threads.into_iter().map(|t| t.join().unwrap_or(0)).sum()
    })
}

/// Book every passenger, spreading them over the regions round-robin
fn book_passengers(
    dispatcher: &Dispatcher,
    settings: &SimSettings,
) -> Vec<(String, BookingHandle)> {
    let mut regions: Vec<&String> = settings.regions.keys().collect();
    regions.sort();
    let max_travel = Duration::from_millis(settings.max_travel_ms);

    (0..settings.passengers)
        .zip(regions.iter().cycle())
        .filter_map(|(i, region)| {
            let passenger = Passenger::random(format!("P-{i}"), max_travel);
            match dispatcher.try_book(passenger, region) {
                Ok(handle) => Some(((*region).clone(), handle)),
                Err(e) => {
                    tracing::warn!("booking P-{i} rejected: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Outcome of all bookings of a run
#[derive(Debug, Default)]
struct Tally {
    completed: u32,
    failed: u32,
    total_trip: Duration,
}

impl Tally {
    fn record(&mut self, region: &str, result: Option<BookingResult>) {
        let Some(result) = result else {
            self.failed += 1;
            return;
        };
        self.completed += 1;
        self.total_trip += result.trip_duration;
        tracing::debug!(
            region = %region,
            booking = result.booking_id,
            driver = %result.driver,
            passenger = %result.passenger,
            "trip finished in {}ms",
            result.trip_duration.as_millis()
        );
    }

    fn average(&self) -> Duration {
        if self.completed > 0 {
            self.total_trip / self.completed
        } else {
            Duration::ZERO
        }
    }
}

/// How long all bookings may reasonably take with `drivers` drivers
///
/// Without drivers nothing can ever finish, so there is nothing to wait for.
fn patience(settings: &SimSettings, drivers: u32) -> Duration {
    if drivers == 0 {
        return Duration::ZERO;
    }
    let trips_per_driver = u64::from(settings.passengers.div_ceil(drivers));
    let per_trip = settings.max_pickup_ms.saturating_add(settings.max_travel_ms);
    Duration::from_millis(per_trip.saturating_mul(trips_per_driver).saturating_add(1000))
}

/// Collect every booking, shut the dispatcher down and return the tally
///
/// Bookings still running at `deadline` are given until the shutdown drain
/// is over; if regions do not drain, the remaining bookings are aborted.
/// Each booking is waited for at most `drain_timeout` after the shutdown.
fn run_to_completion(
    dispatcher: &Dispatcher,
    handles: Vec<(String, BookingHandle)>,
    deadline: Instant,
    drain_timeout: Duration,
) -> Tally {
    let mut tally = Tally::default();
    let mut late = Vec::new();
    for (region, handle) in handles {
        let left = deadline.saturating_duration_since(Instant::now());
        match handle.wait_timeout(left) {
            Ok(result) => tally.record(&region, result),
            Err(handle) => late.push((region, handle)),
        }
    }
    if !late.is_empty() {
        tracing::warn!(late = late.len(), "bookings still running, shutting down");
    }

    let undrained = dispatcher.shutdown();
    if !undrained.is_empty() {
        tracing::warn!(?undrained, "regions did not drain, aborting");
        dispatcher.abort();
    }

    for (region, handle) in late {
        match handle.wait_timeout(drain_timeout) {
            Ok(result) => tally.record(&region, result),
            Err(handle) => {
                tracing::error!(booking = handle.id(), "booking never resolved");
                tally.failed += 1;
            }
        }
    }
    tally
}

fn main() -> Result<()> {
    init_tracing();
    let opts = Opts::from_args();
    let settings = opts.settings()?;
    if let Some(path) = &settings.path {
        tracing::info!("using settings from {}", path.display());
    }

    let config = Config::new(settings.regions.clone(), settings.log_events)
        .with_drain_timeout(Duration::from_secs(settings.drain_timeout_secs))
        .with_max_pickup(Duration::from_millis(settings.max_pickup_ms));
    let dispatcher = nuber_dispatch::launch(&config)?;

    let start = Instant::now();
    let added = add_drivers(&dispatcher, settings.drivers);
    tracing::info!(added, "drivers ready");

    let handles = book_passengers(&dispatcher, &settings);
    tracing::info!(
        booked = handles.len(),
        awaiting = dispatcher.bookings_awaiting_driver(),
        "passengers booked"
    );

    let deadline = Instant::now() + patience(&settings, added);
    let tally = run_to_completion(&dispatcher, handles, deadline, config.drain_timeout);

    println!(
        "{} trips completed, {} failed, average trip {}ms, total {}ms",
        tally.completed,
        tally.failed,
        tally.average().as_millis(),
        start.elapsed().as_millis()
    );
    Ok(())
}
