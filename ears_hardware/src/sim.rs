//! Simulated ear: a slotted disc, its H-bridge motor and its encoder line.
//!
//! The disc is modelled as an angle in abstract units. Hole `k` (raw index,
//! 0 being the first hole after the gap when turning forward) spans
//! `[k * pitch, k * pitch + hole]`; the encoder reads low inside a hole.
//! Turning forward, the falling edge of hole `k` is at its leading side;
//! turning backward it is at the trailing side. The gap sits between hole 16
//! and hole 0 and is `gap` units wide instead of `pitch`.
//!
//! Time only passes through the injected [`Clock`]: with a `ManualClock` the
//! simulation is fully deterministic, with a `MonotonicClock` it runs in real
//! time (see [`SimRunner`]).
use ears_traits::{Clock, Drive, EncoderLevel, HalError, MotorDriver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::HwError;

/// Holes on the disc, including the one following the gap.
pub const SIM_HOLES: u32 = 17;

/// Disc geometry in abstract angle units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscGeometry {
    /// Distance between two ordinary holes.
    pub pitch: u32,
    /// Distance from hole 16 to hole 0 across the gap.
    pub gap: u32,
    /// Width of one hole (encoder low).
    pub hole: u32,
}

impl Default for DiscGeometry {
    /// Proportions measured on real ears: ~200 ms per hole, ~750 ms for the
    /// gap and the signal low for ~70 ms, at one unit per millisecond.
    fn default() -> Self {
        Self {
            pitch: 200,
            gap: 750,
            hole: 70,
        }
    }
}

impl DiscGeometry {
    #[inline]
    pub fn circumference(&self) -> u32 {
        (SIM_HOLES - 1) * self.pitch + self.gap
    }

    #[inline]
    fn hole_start(&self, k: u32) -> u32 {
        k * self.pitch
    }

    /// Forward distance from `from` to `to` on the circle, never zero.
    #[inline]
    fn ahead(&self, from: u32, to: u32) -> u32 {
        let circ = self.circumference();
        let d = (to + circ - from) % circ;
        if d == 0 { circ } else { d }
    }

    /// Next falling edge when turning in `drive` direction: (target angle, distance).
    fn next_edge(&self, angle: u32, drive: Drive) -> Option<(u32, u32)> {
        let circ = self.circumference();
        (0..SIM_HOLES)
            .map(|k| match drive {
                Drive::Forward => {
                    let a = self.hole_start(k);
                    Some((a, self.ahead(angle, a)))
                }
                Drive::Backward => {
                    let b = (self.hole_start(k) + self.hole) % circ;
                    Some((b, self.ahead(b, angle)))
                }
                Drive::Stop => None,
            })
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min_by_key(|&(_, d)| d)
    }

    /// Raw index of the hole under the sensor, if any.
    fn hole_at(&self, angle: u32) -> Option<u8> {
        let circ = self.circumference();
        (0..SIM_HOLES)
            .find(|&k| (angle + circ - self.hole_start(k)) % circ <= self.hole)
            .map(|k| k as u8)
    }
}

#[derive(Debug)]
struct DiscState {
    geometry: DiscGeometry,
    angle: u32,
    drive: Drive,
    overrun: u32,
    stalled: bool,
    encoder_faulty: bool,
    edges: u64,
    drive_writes: u64,
}

impl DiscState {
    fn rotate(&mut self, drive: Drive, units: u32) {
        let circ = self.geometry.circumference();
        let units = units % circ;
        self.angle = match drive {
            Drive::Forward => (self.angle + units) % circ,
            Drive::Backward => (self.angle + circ - units) % circ,
            Drive::Stop => self.angle,
        };
    }
}

/// Shared handle to one simulated disc.
#[derive(Debug, Clone)]
pub struct SimDisc<C: Clock> {
    state: Arc<Mutex<DiscState>>,
    clock: C,
    unit: Duration,
}

impl<C: Clock + Clone> SimDisc<C> {
    /// New disc resting inside `start_hole` (leading side), motor stopped.
    pub fn new(geometry: DiscGeometry, start_hole: u8, unit: Duration, clock: C) -> Self {
        let start = geometry.hole_start(u32::from(start_hole) % SIM_HOLES);
        Self {
            state: Arc::new(Mutex::new(DiscState {
                geometry,
                angle: start,
                drive: Drive::Stop,
                overrun: 0,
                stalled: false,
                encoder_faulty: false,
                edges: 0,
                drive_writes: 0,
            })),
            clock,
            unit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DiscState> {
        // A poisoned disc only means a test thread panicked; the data is still usable.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor {
            state: self.state.clone(),
        }
    }

    pub fn encoder(&self) -> SimEncoder {
        SimEncoder {
            state: self.state.clone(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Let the motor turn the disc until the next falling edge.
    ///
    /// Returns the edge timestamp, or `None` when the motor is stopped,
    /// stalled, or its drive changed while the disc was moving.
    pub fn next_edge(&self) -> Option<Instant> {
        let (target, distance, drive) = {
            let st = self.lock();
            if st.stalled {
                return None;
            }
            let (target, distance) = st.geometry.next_edge(st.angle, st.drive)?;
            (target, distance, st.drive)
        };
        self.clock.sleep(self.unit.saturating_mul(distance));
        let mut st = self.lock();
        if st.drive != drive || st.stalled {
            return None;
        }
        st.angle = target;
        st.edges += 1;
        Some(self.clock.now())
    }

    /// Turn the disc by hand to the next falling edge in `drive` direction,
    /// regardless of the motor.
    pub fn turn_by_hand(&self, drive: Drive) -> Option<Instant> {
        let (target, distance) = {
            let st = self.lock();
            st.geometry.next_edge(st.angle, drive)?
        };
        self.clock.sleep(self.unit.saturating_mul(distance));
        let mut st = self.lock();
        st.angle = target;
        st.edges += 1;
        Some(self.clock.now())
    }

    /// Push the disc by a few units without crossing into the next hole edge.
    pub fn nudge(&self, drive: Drive, units: u32) {
        self.lock().rotate(drive, units);
    }

    /// Units the disc keeps turning after the motor is stopped.
    pub fn set_overrun(&self, units: u32) {
        self.lock().overrun = units;
    }

    /// A stalled (jammed) disc does not move and produces no edges.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// Make level reads on the encoder fail.
    pub fn set_encoder_faulty(&self, faulty: bool) {
        self.lock().encoder_faulty = faulty;
    }

    pub fn drive(&self) -> Drive {
        self.lock().drive
    }

    pub fn angle(&self) -> u32 {
        self.lock().angle
    }

    pub fn is_high(&self) -> bool {
        let st = self.lock();
        st.geometry.hole_at(st.angle).is_none()
    }

    /// Raw hole index under the sensor, `None` between holes.
    pub fn hole(&self) -> Option<u8> {
        let st = self.lock();
        st.geometry.hole_at(st.angle)
    }

    pub fn edges(&self) -> u64 {
        self.lock().edges
    }

    pub fn drive_writes(&self) -> u64 {
        self.lock().drive_writes
    }

    pub fn geometry(&self) -> DiscGeometry {
        self.lock().geometry
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }
}

/// H-bridge of a simulated disc.
#[derive(Debug, Clone)]
pub struct SimMotor {
    state: Arc<Mutex<DiscState>>,
}

impl MotorDriver for SimMotor {
    fn drive(&mut self, drive: Drive) -> Result<(), HalError> {
        let mut st = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let previous = st.drive;
        if drive == Drive::Stop && previous != Drive::Stop && !st.stalled {
            let overrun = st.overrun;
            st.rotate(previous, overrun);
        }
        st.drive = drive;
        st.drive_writes += 1;
        tracing::trace!(?drive, "sim motor drive");
        Ok(())
    }
}

/// Encoder line of a simulated disc.
#[derive(Debug, Clone)]
pub struct SimEncoder {
    state: Arc<Mutex<DiscState>>,
}

impl EncoderLevel for SimEncoder {
    fn is_high(&self) -> Result<bool, HalError> {
        let st = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if st.encoder_faulty {
            return Err(Box::new(HwError::Disconnected));
        }
        Ok(st.geometry.hole_at(st.angle).is_none())
    }
}

/// Background thread turning a simulated disc in real time and delivering
/// falling edges to a callback, like the encoder interrupt would.
///
/// The thread is stopped and joined when the runner is dropped.
pub struct SimRunner {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SimRunner {
    pub fn spawn<C, F>(disc: SimDisc<C>, idle_poll: Duration, mut on_edge: F) -> Self
    where
        C: Clock + Clone + Send + 'static,
        F: FnMut(Instant) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("sim runner received shutdown signal");
                    break;
                }
                match disc.next_edge() {
                    Some(at) => on_edge(at),
                    None => std::thread::sleep(idle_poll),
                }
            }
            tracing::trace!("sim runner exiting cleanly");
        });
        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for SimRunner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "sim runner thread panicked during shutdown");
            }
        }
    }
}
