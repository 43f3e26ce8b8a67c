//! Edge watchdog.
//!
//! [`Watchdog`] is the deadline itself; it lives inside the locked state
//! machine so that arming, disarming and expiry checks are atomic with the
//! transitions. [`WatchdogThread`] is the timer that wakes up when the
//! deadline may have passed and asks the machine to check it.
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Single-shot deadline, re-armed on every expected edge.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Time left before expiry; `None` when disarmed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}

/// Handle used to wake the watchdog thread after the deadline moved earlier
/// (typically: armed from disarmed).
#[derive(Debug, Clone)]
pub struct WatchdogPoke(xch::Sender<()>);

impl WatchdogPoke {
    pub fn poke(&self) {
        // A full channel already guarantees a pending wake-up.
        let _ = self.0.try_send(());
    }
}

/// Background timer thread.
///
/// `tick` checks the deadline and returns how long to sleep until the next
/// check, or `None` to sleep until poked. The thread is stopped and joined
/// when this handle is dropped.
pub struct WatchdogThread {
    poke: WatchdogPoke,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl WatchdogThread {
    pub fn channel() -> (WatchdogPoke, xch::Receiver<()>) {
        let (tx, rx) = xch::bounded(1);
        (WatchdogPoke(tx), rx)
    }

    pub fn spawn<F>(poke: WatchdogPoke, rx: xch::Receiver<()>, mut tick: F) -> Self
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("watchdog thread received shutdown signal");
                    break;
                }
                let woke = match tick() {
                    Some(wait) => match rx.recv_timeout(wait) {
                        Ok(()) | Err(xch::RecvTimeoutError::Timeout) => true,
                        Err(xch::RecvTimeoutError::Disconnected) => false,
                    },
                    None => rx.recv().is_ok(),
                };
                if !woke {
                    tracing::debug!("watchdog pokers disconnected, exiting thread");
                    break;
                }
            }
            tracing::trace!("watchdog thread exiting cleanly");
        });
        Self {
            poke,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn poker(&self) -> WatchdogPoke {
        self.poke.clone()
    }
}

impl Drop for WatchdogThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.poke.poke();
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "watchdog thread panicked during shutdown");
            }
        }
    }
}
