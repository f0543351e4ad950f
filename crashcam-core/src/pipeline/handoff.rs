use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::CrashCamError;

/// Control-thread half of the one-shot handoff.
///
/// `release` tells the worker that the control thread has let go of the ring
/// buffer and storage. Dropping it unreleased breaks the handoff.
#[derive(Debug)]
pub struct Handoff {
    tx: SyncSender<()>,
}

impl Handoff {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

/// Worker half of the one-shot handoff.
#[derive(Debug)]
pub(crate) struct HandoffWaiter {
    rx: Receiver<()>,
}

impl HandoffWaiter {
    /// Block until the control thread releases, drops, or `timeout` expires.
    pub(crate) fn wait(self, timeout: Duration) -> Result<(), CrashCamError> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(CrashCamError::Timeout(format!(
                "control thread did not take the handoff within {:?}",
                timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(CrashCamError::HandoffBroken),
        }
    }
}

pub(crate) fn handoff_pair() -> (Handoff, HandoffWaiter) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Handoff { tx }, HandoffWaiter { rx })
}

/// Cancellation flag with an interruptible sleep.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub(crate) fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `duration` unless cancelled first. Returns whether the token
    /// was cancelled.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock();
        while !*cancelled {
            if cvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn release_completes_handoff() {
        let (handoff, waiter) = handoff_pair();
        thread::spawn(move || handoff.release());
        assert_eq!(waiter.wait(Duration::from_secs(2)), Ok(()));
    }

    #[test]
    fn dropped_handoff_is_broken() {
        let (handoff, waiter) = handoff_pair();
        drop(handoff);
        assert_eq!(waiter.wait(Duration::from_secs(2)), Err(CrashCamError::HandoffBroken));
    }

    #[test]
    fn unanswered_handoff_times_out() {
        let (_handoff, waiter) = handoff_pair();
        assert!(matches!(
            waiter.wait(Duration::from_millis(20)),
            Err(CrashCamError::Timeout(_))
        ));
    }

    #[test]
    fn sleep_runs_to_deadline() {
        let token = CancelToken::default();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let token = CancelToken::default();
        let canceller = token.clone();
        let start = Instant::now();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }
}
