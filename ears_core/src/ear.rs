//! Thread-safe handle around one [`EarMachine`].
//!
//! Edges (from an interrupt callback or the simulator thread), the watchdog
//! thread and command callers all go through one mutex. Writers block until
//! the ear settles; readers block until the mailbox holds something, and see
//! end-of-stream once the ear is broken.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use ears_traits::{Clock, EncoderLevel, MonotonicClock, MotorDriver};

use crate::Side;
use crate::command::{Command, CommandFramer, Decoded};
use crate::config::EarConfig;
use crate::error::{BuildError, EarError, Result};
use crate::machine::{EarMachine, EarSnapshot, Wake};
use crate::mailbox::Reading;
use crate::watchdog::{WatchdogPoke, WatchdogThread};

/// Non-blocking readiness, in the manner of `poll(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// A command needing the ear idle would not block.
    pub writable: bool,
    /// A reading is pending.
    pub readable: bool,
    /// The ear is broken; writes fail and reads hit end-of-stream.
    pub hangup: bool,
}

struct Inner<M, E, C> {
    machine: EarMachine<M, E, C>,
    framer: CommandFramer,
}

struct Shared<M, E, C> {
    side: Side,
    inner: Mutex<Inner<M, E, C>>,
    settled: Condvar,
    readable: Condvar,
    poke: WatchdogPoke,
}

impl<M, E, C> Shared<M, E, C>
where
    M: MotorDriver,
    E: EncoderLevel,
    C: Clock,
{
    fn lock(&self) -> MutexGuard<'_, Inner<M, E, C>> {
        // A panic while holding the lock leaves the machine in a consistent
        // state: every transition replaces the state wholesale.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn notify(&self, wake: Wake) {
        if wake.settled {
            self.settled.notify_all();
        }
        if wake.reported {
            self.readable.notify_all();
        }
        if wake.rearmed {
            self.poke.poke();
        }
    }

    fn edge(&self, at: Instant) {
        let wake = self.lock().machine.on_edge(at);
        self.notify(wake);
    }

    fn check_watchdog(&self) -> Option<Duration> {
        let (wake, remaining) = {
            let mut inner = self.lock();
            let wake = inner.machine.check_watchdog();
            (wake, inner.machine.watchdog_remaining())
        };
        self.notify(wake);
        remaining
    }

    fn wait_settled<'a>(
        &'a self,
        guard: MutexGuard<'a, Inner<M, E, C>>,
        timeout: Option<Duration>,
    ) -> std::result::Result<MutexGuard<'a, Inner<M, E, C>>, EarError> {
        match timeout {
            None => Ok(self
                .settled
                .wait_while(guard, |i| !i.machine.is_settled())
                .unwrap_or_else(|p| p.into_inner())),
            Some(t) => {
                let (guard, res) = self
                    .settled
                    .wait_timeout_while(guard, t, |i| !i.machine.is_settled())
                    .unwrap_or_else(|p| p.into_inner());
                if res.timed_out() {
                    Err(EarError::Timeout)
                } else {
                    Ok(guard)
                }
            }
        }
    }

    /// Wait for the ear unless `cmd` may run mid-motion, then run it.
    fn run(&self, cmd: Command, timeout: Option<Duration>) -> std::result::Result<(), EarError> {
        let mut guard = self.lock();
        if guard.machine.is_broken() {
            return Err(EarError::Broken);
        }
        if cmd.waits_for_idle() {
            guard = self.wait_settled(guard, timeout)?;
        }
        let res = guard.machine.execute(cmd);
        drop(guard);
        match res {
            Ok(wake) => {
                self.notify(wake);
                Ok(())
            }
            Err(e) => {
                // The machine may have broken while handling the command.
                self.notify(Wake {
                    settled: true,
                    reported: true,
                    rearmed: false,
                });
                Err(e)
            }
        }
    }
}

/// Cloneable handle delivering encoder edges to an ear.
pub struct EdgeSink<M, E, C> {
    shared: Arc<Shared<M, E, C>>,
}

impl<M, E, C> Clone for EdgeSink<M, E, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M, E, C> EdgeSink<M, E, C>
where
    M: MotorDriver,
    E: EncoderLevel,
    C: Clock,
{
    pub fn edge(&self, at: Instant) {
        self.shared.edge(at);
    }
}

/// One running ear: state machine plus watchdog thread.
///
/// Dropping the handle stops the watchdog thread and the motor.
pub struct Ear<M, E, C>
where
    M: MotorDriver,
    E: EncoderLevel,
    C: Clock,
{
    shared: Arc<Shared<M, E, C>>,
    watchdog: Option<WatchdogThread>,
}

impl<M, E, C> Ear<M, E, C>
where
    M: MotorDriver + Send + 'static,
    E: EncoderLevel + Send + 'static,
    C: Clock + Send + 'static,
{
    fn start(side: Side, machine: EarMachine<M, E, C>, calibrate: bool) -> Self {
        let (poke, rx) = WatchdogThread::channel();
        let shared = Arc::new(Shared {
            side,
            inner: Mutex::new(Inner {
                machine,
                framer: CommandFramer::default(),
            }),
            settled: Condvar::new(),
            readable: Condvar::new(),
            poke: poke.clone(),
        });
        let ticker = shared.clone();
        let watchdog = WatchdogThread::spawn(poke, rx, move || ticker.check_watchdog());
        if calibrate {
            let wake = shared.lock().machine.begin();
            shared.notify(wake);
        }
        tracing::info!(side = side.name(), "ear started");
        Self {
            shared,
            watchdog: Some(watchdog),
        }
    }
}

impl<M, E, C> Ear<M, E, C>
where
    M: MotorDriver,
    E: EncoderLevel,
    C: Clock,
{
    pub fn side(&self) -> Side {
        self.shared.side
    }

    pub fn edge_sink(&self) -> EdgeSink<M, E, C> {
        EdgeSink {
            shared: self.shared.clone(),
        }
    }

    /// Deliver one encoder edge.
    pub fn edge(&self, at: Instant) {
        self.shared.edge(at);
    }

    /// Check the watchdog deadline now instead of waiting for the timer.
    pub fn check_watchdog(&self) {
        let _ = self.shared.check_watchdog();
    }

    /// Run a command, waiting for the ear to settle first when it must.
    pub fn submit(&self, cmd: Command) -> std::result::Result<(), EarError> {
        self.shared.run(cmd, None)
    }

    pub fn submit_timeout(
        &self,
        cmd: Command,
        timeout: Duration,
    ) -> std::result::Result<(), EarError> {
        self.shared.run(cmd, Some(timeout))
    }

    /// Byte-stream write: decodes at most one command and runs it.
    ///
    /// Returns the number of bytes consumed. An opcode missing its argument
    /// is kept and completed by the next write.
    pub fn write(&self, bytes: &[u8]) -> std::result::Result<usize, EarError> {
        let mut guard = self.shared.lock();
        if guard.machine.is_broken() {
            return Err(EarError::Broken);
        }
        let mut consumed = 0;
        let mut cmd = None;
        for &byte in bytes {
            consumed += 1;
            match guard.framer.push(byte) {
                Decoded::Command(c) => {
                    cmd = Some(c);
                    break;
                }
                Decoded::Pending => {}
                Decoded::Unknown(b) => {
                    tracing::warn!(side = self.shared.side.name(), byte = b, "unknown opcode");
                }
            }
        }
        drop(guard);
        if let Some(cmd) = cmd {
            self.shared.run(cmd, None)?;
        }
        Ok(consumed)
    }

    /// Blocking read. `None` means end-of-stream: the ear is broken.
    pub fn read(&self) -> Option<Reading> {
        let mut guard = self.shared.lock();
        loop {
            if guard.machine.is_broken() {
                return None;
            }
            if let Some(r) = guard.machine.take_reading() {
                return Some(r);
            }
            guard = self
                .shared
                .readable
                .wait(guard)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Like [`read`](Ear::read) but gives up after `timeout`.
    pub fn read_timeout(&self, timeout: Duration) -> std::result::Result<Option<Reading>, EarError> {
        let guard = self.shared.lock();
        let (mut guard, res) = self
            .shared
            .readable
            .wait_timeout_while(guard, timeout, |i| {
                !i.machine.is_broken() && i.machine.pending().is_none()
            })
            .unwrap_or_else(|p| p.into_inner());
        if guard.machine.is_broken() {
            return Ok(None);
        }
        if res.timed_out() {
            return Err(EarError::Timeout);
        }
        Ok(guard.machine.take_reading())
    }

    /// Non-blocking read.
    pub fn try_read(&self) -> std::result::Result<Option<Reading>, EarError> {
        let mut guard = self.shared.lock();
        if guard.machine.is_broken() {
            return Err(EarError::Broken);
        }
        Ok(guard.machine.take_reading())
    }

    pub fn wait_settled(&self) {
        let guard = self.shared.lock();
        drop(self.shared.wait_settled(guard, None));
    }

    pub fn wait_settled_timeout(&self, timeout: Duration) -> std::result::Result<(), EarError> {
        let guard = self.shared.lock();
        self.shared.wait_settled(guard, Some(timeout)).map(drop)
    }

    pub fn poll(&self) -> Readiness {
        let guard = self.shared.lock();
        let hangup = guard.machine.is_broken();
        Readiness {
            writable: guard.machine.is_settled() && !hangup,
            readable: !hangup && guard.machine.pending().is_some(),
            hangup,
        }
    }

    pub fn snapshot(&self) -> EarSnapshot {
        self.shared.lock().machine.snapshot()
    }

    pub fn is_broken(&self) -> bool {
        self.shared.lock().machine.is_broken()
    }

    pub fn last_error(&self) -> Option<EarError> {
        self.shared.lock().machine.last_error().cloned()
    }

    /// Stop the motor right away (emergency path).
    pub fn stop(&self) {
        self.shared.lock().machine.stop_motor();
    }
}

impl<M, E, C> Drop for Ear<M, E, C>
where
    M: MotorDriver,
    E: EncoderLevel,
    C: Clock,
{
    fn drop(&mut self) {
        drop(self.watchdog.take());
        self.shared.lock().machine.stop_motor();
        tracing::debug!(side = self.shared.side.name(), "ear stopped");
    }
}

/// Builder for [`Ear`]. Motor and encoder are mandatory.
pub struct EarBuilder<M, E, C = MonotonicClock> {
    side: Side,
    motor: Option<M>,
    encoder: Option<E>,
    clock: C,
    config: EarConfig,
    calibrate: bool,
}

impl<M, E> EarBuilder<M, E, MonotonicClock> {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            motor: None,
            encoder: None,
            clock: MonotonicClock::new(),
            config: EarConfig::default(),
            calibrate: true,
        }
    }
}

impl<M, E, C> EarBuilder<M, E, C> {
    pub fn with_motor(mut self, motor: M) -> Self {
        self.motor = Some(motor);
        self
    }

    pub fn with_encoder(mut self, encoder: E) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_config(mut self, config: EarConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip the start-up calibration. The ear starts idle at an unknown
    /// position and, lacking a gap boundary, cannot detect it.
    pub fn without_calibration(mut self) -> Self {
        self.calibrate = false;
        self
    }

    pub fn with_clock<C2>(self, clock: C2) -> EarBuilder<M, E, C2> {
        EarBuilder {
            side: self.side,
            motor: self.motor,
            encoder: self.encoder,
            clock,
            config: self.config,
            calibrate: self.calibrate,
        }
    }
}

impl<M, E, C> EarBuilder<M, E, C>
where
    M: MotorDriver + Send + 'static,
    E: EncoderLevel + Send + 'static,
    C: Clock + Send + 'static,
{
    /// Validate, start the watchdog thread and begin calibration.
    pub fn spawn(self) -> Result<Ear<M, E, C>> {
        self.config.validate()?;
        let motor = self.motor.ok_or(BuildError::MissingMotor)?;
        let encoder = self.encoder.ok_or(BuildError::MissingEncoder)?;
        let machine = EarMachine::new(motor, encoder, self.clock, self.config);
        Ok(Ear::start(self.side, machine, self.calibrate))
    }
}
