//! Wiring the two ears to a backend (simulated disc or GPIO).

use std::sync::Arc;
use std::time::Duration;

use ears_config::Config;
use ears_core::{Ear, EarBuilder, EarConfig, EarError, EarSnapshot, Reading, Side};
use ears_hardware::sim::{DiscGeometry, SimDisc, SimRunner};
use ears_traits::{Clock, EncoderLevel, MonotonicClock, MotorDriver};
use eyre::{Result, WrapErr};

/// How often the sim runner looks at a stopped disc.
const SIM_IDLE_POLL: Duration = Duration::from_millis(1);

/// Object-safe view of a running ear, so the CLI does not care which
/// backend sits underneath.
pub trait EarHandle: Send + Sync {
    fn side(&self) -> Side;
    fn submit_timeout(&self, cmd: ears_core::Command, timeout: Duration) -> Result<(), EarError>;
    fn read_timeout(&self, timeout: Duration) -> Result<Option<Reading>, EarError>;
    fn wait_settled_timeout(&self, timeout: Duration) -> Result<(), EarError>;
    fn snapshot(&self) -> EarSnapshot;
    fn last_error(&self) -> Option<EarError>;
    fn stop(&self);
}

impl<M, E, C> EarHandle for Ear<M, E, C>
where
    M: MotorDriver + Send + 'static,
    E: EncoderLevel + Send + 'static,
    C: Clock + Send + 'static,
{
    fn side(&self) -> Side {
        Ear::side(self)
    }
    fn submit_timeout(&self, cmd: ears_core::Command, timeout: Duration) -> Result<(), EarError> {
        Ear::submit_timeout(self, cmd, timeout)
    }
    fn read_timeout(&self, timeout: Duration) -> Result<Option<Reading>, EarError> {
        Ear::read_timeout(self, timeout)
    }
    fn wait_settled_timeout(&self, timeout: Duration) -> Result<(), EarError> {
        Ear::wait_settled_timeout(self, timeout)
    }
    fn snapshot(&self) -> EarSnapshot {
        Ear::snapshot(self)
    }
    fn last_error(&self) -> Option<EarError> {
        Ear::last_error(self)
    }
    fn stop(&self) {
        Ear::stop(self);
    }
}

/// The ears of one CLI run plus whatever keeps their edges flowing.
///
/// Ears are declared before the runners so they stop their motors first on drop.
pub struct Rig {
    ears: Vec<Arc<dyn EarHandle>>,
    _runners: Vec<SimRunner>,
}

impl Rig {
    pub fn ears(&self) -> &[Arc<dyn EarHandle>] {
        &self.ears
    }

    pub fn ear(&self, side: Side) -> Option<&Arc<dyn EarHandle>> {
        self.ears.iter().find(|e| e.side() == side)
    }

    /// Cut power to every motor.
    pub fn stop_all(&self) {
        for ear in &self.ears {
            ear.stop();
        }
    }
}

/// Start the requested ears on the backend selected at build time.
pub fn start(cfg: &Config, sides: &[Side]) -> Result<Rig> {
    let ear_cfg = EarConfig::from(cfg);
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        start_hardware(cfg, ear_cfg, sides)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        start_sim(cfg, ear_cfg, sides)
    }
}

#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
fn start_sim(cfg: &Config, ear_cfg: EarConfig, sides: &[Side]) -> Result<Rig> {
    let geometry = DiscGeometry {
        pitch: cfg.sim.pitch,
        gap: cfg.sim.gap,
        hole: cfg.sim.hole,
    };
    let unit = Duration::from_micros(cfg.sim.unit_us);
    let mut ears: Vec<Arc<dyn EarHandle>> = Vec::with_capacity(sides.len());
    let mut runners = Vec::with_capacity(sides.len());
    for &side in sides {
        let start_hole = match side {
            Side::Left => cfg.sim.start_hole_left,
            Side::Right => cfg.sim.start_hole_right,
        };
        let disc = SimDisc::new(geometry, start_hole, unit, MonotonicClock::new());
        disc.set_overrun(cfg.sim.overrun);
        let ear = EarBuilder::new(side)
            .with_motor(disc.motor())
            .with_encoder(disc.encoder())
            .with_config(ear_cfg)
            .spawn()
            .wrap_err_with(|| format!("start {side} ear"))?;
        let sink = ear.edge_sink();
        runners.push(SimRunner::spawn(disc, SIM_IDLE_POLL, move |at| sink.edge(at)));
        tracing::info!(%side, start_hole, unit_us = cfg.sim.unit_us, "sim ear started");
        ears.push(Arc::new(ear));
    }
    Ok(Rig {
        ears,
        _runners: runners,
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn start_hardware(cfg: &Config, ear_cfg: EarConfig, sides: &[Side]) -> Result<Rig> {
    use ears_hardware::{HardwareEncoder, HardwareMotor};

    let mut ears: Vec<Arc<dyn EarHandle>> = Vec::with_capacity(sides.len());
    for &side in sides {
        let pins = match side {
            Side::Left => cfg.left,
            Side::Right => cfg.right,
        };
        let motor = HardwareMotor::new(pins.motor_forward, pins.motor_backward)
            .wrap_err_with(|| format!("open motor pins for {side} ear"))?;
        let encoder = HardwareEncoder::new(pins.encoder)
            .wrap_err_with(|| format!("open encoder pin for {side} ear"))?;
        let interrupt = encoder.clone();
        let ear = EarBuilder::new(side)
            .with_motor(motor)
            .with_encoder(encoder)
            .with_config(ear_cfg)
            .spawn()
            .wrap_err_with(|| format!("start {side} ear"))?;
        let sink = ear.edge_sink();
        interrupt
            .on_falling_edge(move |at| sink.edge(at))
            .wrap_err_with(|| format!("arm encoder interrupt for {side} ear"))?;
        tracing::info!(%side, encoder = pins.encoder, "hardware ear started");
        ears.push(Arc::new(ear));
    }
    Ok(Rig {
        ears,
        _runners: Vec::new(),
    })
}
