//! Cancellable waiting
//!
//! Every blocking point of a booking (admission slot, driver, pickup, drive)
//! waits through an [`Interrupt`] so that cancelling the booking, or aborting
//! the whole dispatcher, wakes it up.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError};
use crossbeam::select;
use parking_lot::Mutex;

use crate::error::Interrupted;

/// A one-shot cancellation signal shared between threads
///
/// Cancelling drops the only sender of a zero-capacity channel, so every
/// current and future receive on the signal fails immediately.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Fire the signal. Returns `false` if it was already fired.
    pub fn cancel(&self) -> bool {
        self.inner.trigger.lock().take().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The two ways a single booking can be interrupted: its own token and the
/// dispatcher-wide abort token
#[derive(Clone, Debug)]
pub struct Interrupt {
    own: CancelToken,
    abort: CancelToken,
}

impl Interrupt {
    pub fn new(own: CancelToken, abort: CancelToken) -> Self {
        Self { own, abort }
    }

    pub fn is_interrupted(&self) -> bool {
        self.own.is_cancelled() || self.abort.is_cancelled()
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_interrupted() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Receive from `channel`, giving up if interrupted first
    ///
    /// A disconnected channel counts as an interruption as well: whatever
    /// was supposed to arrive can no longer arrive.
    pub fn recv<T>(&self, channel: &Receiver<T>) -> Result<T, Interrupted> {
        self.check()?;
        select! {
            recv(channel) -> msg => msg.map_err(|_| Interrupted),
            recv(self.own.signal()) -> _ => Err(Interrupted),
            recv(self.abort.signal()) -> _ => Err(Interrupted),
        }
    }

    /// Suspend for `duration` unless interrupted earlier
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.check()?;
        select! {
            recv(self.own.signal()) -> _ => Err(Interrupted),
            recv(self.abort.signal()) -> _ => Err(Interrupted),
            default(duration) => Ok(()),
        }
    }
}
