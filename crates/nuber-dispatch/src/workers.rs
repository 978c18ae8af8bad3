//! Shared pool of worker threads running admitted bookings

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Grows on demand and shrinks when idle
///
/// A job is handed to an idle worker if there is one and to a freshly
/// spawned worker otherwise, so a job never waits behind a worker that is
/// blocked on a driver or an admission slot.
pub(crate) struct WorkerPool {
    /// `None` once the pool has been shut down
    queue: Mutex<Option<Sender<Job>>>,
    shared: Arc<Shared>,
}

struct Shared {
    jobs: Receiver<Job>,
    /// workers blocked on `jobs` that nobody has claimed yet
    idle: AtomicUsize,
    live: AtomicUsize,
    next_id: AtomicUsize,
    keep_alive: Duration,
}

impl Shared {
    /// Claim one idle worker for a job about to be queued
    fn claim_idle(&self) -> bool {
        self.idle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl WorkerPool {
    pub fn new(keep_alive: Duration) -> Self {
        let (sender, jobs) = unbounded();
        Self {
            queue: Mutex::new(Some(sender)),
            shared: Arc::new(Shared {
                jobs,
                idle: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
                keep_alive,
            }),
        }
    }

    /// Run `job` on some worker
    ///
    /// Hands the job back if the pool has been shut down.
    pub fn execute(&self, job: Job) -> Result<(), Job> {
        let queue = self.queue.lock();
        let Some(sender) = queue.as_ref() else {
            return Err(job);
        };

        if self.shared.claim_idle() {
            return sender.send(job).map_err(|e| e.into_inner());
        }

        let shared = self.shared.clone();
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        shared.live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("nuber-worker-{id}"))
            .spawn(move || work(shared, job));
        if let Err(e) = spawned {
            // the job is dropped with the closure; its guards report it as unfinished
            self.shared.live.fetch_sub(1, Ordering::AcqRel);
            tracing::error!("could not spawn worker thread: {e}");
        }
        Ok(())
    }

    /// Stop accepting jobs; queued jobs still run
    pub fn shutdown(&self) {
        if self.queue.lock().take().is_some() {
            tracing::debug!(live = self.live(), "worker pool closed");
        }
    }

    /// Number of worker threads alive
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }
}

fn run(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!("booking job panicked");
    }
}

/// main worker loop
fn work(shared: Arc<Shared>, first: Job) {
    run(first);
    loop {
        shared.idle.fetch_add(1, Ordering::AcqRel);
        match shared.jobs.recv_timeout(shared.keep_alive) {
            // whoever queued the job already took us off the idle count
            Ok(job) => run(job),
            Err(RecvTimeoutError::Timeout) => {
                if shared.claim_idle() {
                    break;
                }
                // a job has been promised to an idle worker, take it
                match shared.jobs.recv() {
                    Ok(job) => run(job),
                    Err(_) => break,
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    shared.live.fetch_sub(1, Ordering::AcqRel);
    tracing::trace!("worker retired");
}
