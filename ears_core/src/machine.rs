//! The per-ear state machine.
//!
//! `EarMachine` owns the motor, the encoder level line and the clock, and is
//! driven by three kinds of events: encoder falling edges ([`on_edge`]),
//! watchdog expiry ([`check_watchdog`]) and commands ([`execute`]). It does no
//! locking or blocking of its own; [`crate::ear::Ear`] serialises the events
//! and turns the returned [`Wake`] into condition-variable notifications.
//!
//! Hardware errors never abort a transition half-way: they are recorded and,
//! once the event is fully handled, the motor is stopped and the ear is
//! declared broken.
//!
//! [`on_edge`]: EarMachine::on_edge
//! [`check_watchdog`]: EarMachine::check_watchdog
//! [`execute`]: EarMachine::execute

use std::time::{Duration, Instant};

use ears_traits::{Clock, Drive, EncoderLevel, MotorDriver};

use crate::calibration::{CalibrationBoundary, DELTA_COUNT, GapAnalysis, validate_backward};
use crate::command::Command;
use crate::config::EarConfig;
use crate::error::{EarError, FaultKind};
use crate::hw_error::map_hw_error;
use crate::mailbox::{Mailbox, Reading};
use crate::position::{
    Direction, HoleMap, NUM_HOLES, Position, backward_delta, forward_delta, minimal_delta,
};
use crate::state::{ActuatorState, Detecting, PostAction, Running, Testing};
use crate::watchdog::Watchdog;

/// What changed during one event, for the waiting side.
#[must_use]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    /// State is Idle or Broken after the event.
    pub settled: bool,
    /// Mailbox content changed, or the ear broke (readers must see EOF).
    pub reported: bool,
    /// The watchdog was (re)armed.
    pub rearmed: bool,
}

/// Point-in-time view of one ear, for health output and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarSnapshot {
    pub state: &'static str,
    pub position: Option<Position>,
    pub boundary: Option<Duration>,
    pub fault: Option<FaultKind>,
    pub pending: Option<Reading>,
    pub drive: Drive,
    pub edges: u64,
    pub watchdog_armed: bool,
}

pub struct EarMachine<M, E, C> {
    motor: M,
    encoder: E,
    clock: C,
    config: EarConfig,
    map: HoleMap,
    state: ActuatorState,
    boundary: Option<CalibrationBoundary>,
    mailbox: Mailbox,
    watchdog: Watchdog,
    fault: Option<FaultKind>,
    last_error: Option<EarError>,
    hw_fault: Option<EarError>,
    drive: Drive,
    edges: u64,
    reported: bool,
    rearmed: bool,
}

impl<M, E, C> EarMachine<M, E, C>
where
    M: MotorDriver,
    E: EncoderLevel,
    C: Clock,
{
    /// New machine in `Idle` with unknown position; call [`begin`] to
    /// calibrate.
    ///
    /// [`begin`]: EarMachine::begin
    pub fn new(motor: M, encoder: E, clock: C, config: EarConfig) -> Self {
        Self {
            motor,
            encoder,
            clock,
            map: HoleMap::new(config.reference_hole),
            watchdog: Watchdog::new(config.watchdog_timeout),
            config,
            state: ActuatorState::Idle { position: None },
            boundary: None,
            mailbox: Mailbox::default(),
            fault: None,
            last_error: None,
            hw_fault: None,
            drive: Drive::Stop,
            edges: 0,
            reported: false,
            rearmed: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn position(&self) -> Option<Position> {
        self.state.position()
    }

    pub fn boundary(&self) -> Option<CalibrationBoundary> {
        self.boundary
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.fault
    }

    pub fn last_error(&self) -> Option<&EarError> {
        self.last_error.as_ref()
    }

    #[inline]
    pub fn is_broken(&self) -> bool {
        matches!(self.state, ActuatorState::Broken)
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }

    pub fn config(&self) -> &EarConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog.deadline()
    }

    /// Time until the watchdog fires; `None` when disarmed.
    pub fn watchdog_remaining(&self) -> Option<Duration> {
        self.watchdog.remaining(self.clock.now())
    }

    pub fn pending(&self) -> Option<Reading> {
        self.mailbox.peek()
    }

    /// Consume the pending reading, if any.
    pub fn take_reading(&mut self) -> Option<Reading> {
        self.mailbox.take()
    }

    pub fn snapshot(&self) -> EarSnapshot {
        EarSnapshot {
            state: self.state.name(),
            position: self.state.position(),
            boundary: self.boundary.map(|b| b.get()),
            fault: self.fault,
            pending: self.mailbox.peek(),
            drive: self.drive,
            edges: self.edges,
            watchdog_armed: self.watchdog.is_armed(),
        }
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Start calibration: turn forward and time one full revolution.
    pub fn begin(&mut self) -> Wake {
        if !self.is_broken() {
            tracing::info!("calibrating encoder");
            self.state = ActuatorState::Testing(Testing::default());
            self.set_drive(Drive::Forward);
            self.arm();
        }
        self.finish()
    }

    /// One falling edge of the encoder, timestamped by its source.
    pub fn on_edge(&mut self, at: Instant) -> Wake {
        self.edges += 1;
        match self.state {
            ActuatorState::Testing(t) => self.edge_testing(t, at),
            ActuatorState::Detecting(d) => self.edge_detecting(d, at),
            ActuatorState::Idle { position } => self.edge_idle(position),
            ActuatorState::Running(r) => self.edge_running(r),
            ActuatorState::Broken => {}
        }
        self.finish()
    }

    /// Fire the watchdog if its deadline has passed.
    pub fn check_watchdog(&mut self) -> Wake {
        if self.watchdog.is_expired(self.clock.now()) {
            self.on_watchdog()
        } else {
            self.finish()
        }
    }

    /// Watchdog expiry: no edge arrived in time.
    pub fn on_watchdog(&mut self) -> Wake {
        self.watchdog.disarm();
        match self.state {
            ActuatorState::Testing(_) => {
                self.set_drive(Drive::Stop);
                tracing::error!(
                    timeout_ms = self.watchdog.timeout().as_millis() as u64,
                    "no encoder edge during calibration"
                );
                self.enter_broken(FaultKind::WatchdogTimeout);
            }
            ActuatorState::Running(_) | ActuatorState::Detecting(_) => {
                self.set_drive(Drive::Stop);
                tracing::warn!(
                    state = self.state.name(),
                    timeout_ms = self.watchdog.timeout().as_millis() as u64,
                    "no encoder edge, position is now unknown"
                );
                self.last_error = Some(EarError::Timeout);
                // A reading already waiting for the client stays as it is.
                self.state = ActuatorState::Idle { position: None };
            }
            ActuatorState::Idle { .. } | ActuatorState::Broken => {}
        }
        self.finish()
    }

    /// Run one command.
    ///
    /// Commands that need the ear idle fail with [`EarError::Busy`] while it
    /// moves; callers are expected to wait for the ear to settle first.
    pub fn execute(&mut self, cmd: Command) -> Result<Wake, EarError> {
        match self.state {
            ActuatorState::Broken => return Err(EarError::Broken),
            ActuatorState::Idle { .. } => {}
            _ if !cmd.requires_idle() => {
                if cmd == Command::Query {
                    self.post(Reading::Position(self.state.position()));
                }
                return Ok(self.finish());
            }
            other => return Err(EarError::Busy(other.name())),
        }

        tracing::debug!(%cmd, "command");
        let position = self.resolve_position();
        match cmd {
            Command::Nop => {}
            Command::Query => self.post(Reading::Position(position)),
            Command::QueryOrDetect => match position {
                Some(_) => self.post(Reading::Position(position)),
                None => self.enter_detecting(PostAction::ReadPosition, Direction::Forward),
            },
            Command::Forward(n) => {
                self.refresh(position);
                self.enter_running(position, i32::from(n));
            }
            Command::Backward(n) => {
                self.refresh(position);
                self.enter_running(position, -i32::from(n));
            }
            Command::GotoForward(p) => {
                self.refresh(position);
                self.goto(position, Position::wrapping(i32::from(p)), Direction::Forward);
            }
            Command::GotoBackward(p) => {
                self.refresh(position);
                self.goto(position, Position::wrapping(i32::from(p)), Direction::Backward);
            }
        }

        let wake = self.finish();
        if self.is_broken() {
            return Err(self.last_error.clone().unwrap_or(EarError::Broken));
        }
        Ok(wake)
    }

    /// Best-effort motor stop, for shutdown paths.
    pub fn stop_motor(&mut self) {
        if let Err(e) = self.motor.stop() {
            tracing::warn!(error = %e, "failed to stop motor");
        } else {
            self.drive = Drive::Stop;
        }
    }

    // ── Edge handlers ────────────────────────────────────────────────────

    fn edge_testing(&mut self, mut t: Testing, at: Instant) {
        let Some(last) = t.last_edge else {
            // Synchronising edge: the ear is now exactly on a hole.
            t.last_edge = Some(at);
            self.state = ActuatorState::Testing(t);
            self.arm();
            return;
        };
        let delta = at.saturating_duration_since(last);

        if let (Some(forward_hole), Some(boundary)) = (t.forward_hole, self.boundary) {
            self.set_drive(Drive::Stop);
            self.watchdog.disarm();
            match validate_backward(forward_hole, delta, boundary) {
                Ok(()) => {
                    let position = self.map.to_position(i32::from(forward_hole) - 1);
                    tracing::info!(
                        %position,
                        boundary_ms = boundary.get().as_millis() as u64,
                        "calibration complete"
                    );
                    self.complete(Some(position));
                }
                Err(e) => {
                    tracing::error!(error = %e, "backward validation failed");
                    self.enter_broken(FaultKind::DirectionMismatch);
                }
            }
            return;
        }

        let Some(slot) = t.hole_deltas.get_mut(usize::from(t.holes_seen)) else {
            return;
        };
        *slot = delta;
        t.holes_seen += 1;
        t.last_edge = Some(at);
        if usize::from(t.holes_seen) < DELTA_COUNT {
            self.state = ActuatorState::Testing(t);
            self.arm();
            return;
        }

        match GapAnalysis::from_deltas(&t.hole_deltas) {
            Ok(analysis) => {
                let boundary = analysis.boundary();
                if boundary.get() > self.config.slow_boundary {
                    tracing::warn!(
                        gap_ms = analysis.gap.as_millis() as u64,
                        "ear is abnormally slow"
                    );
                }
                tracing::debug!(
                    gap_ms = analysis.gap.as_millis() as u64,
                    max_ms = analysis.max.as_millis() as u64,
                    min_ms = analysis.min.as_millis() as u64,
                    forward_hole = analysis.forward_hole(),
                    "forward sweep analysed"
                );
                self.boundary = Some(boundary);
                t.forward_hole = Some(analysis.forward_hole());
                t.last_edge = Some(at);
                self.state = ActuatorState::Testing(t);
                self.set_drive(Drive::Backward);
                self.arm();
            }
            Err(e) => {
                self.set_drive(Drive::Stop);
                tracing::error!(error = %e, "calibration failed");
                self.enter_broken(FaultKind::CalibrationAmbiguous);
            }
        }
    }

    fn edge_detecting(&mut self, mut d: Detecting, at: Instant) {
        let Some(last) = d.last_edge else {
            // Started between two holes. Going backward, the hole being
            // left counts as seen.
            if d.direction == Direction::Backward {
                d.holes_seen += 1;
            }
            d.last_edge = Some(at);
            self.state = ActuatorState::Detecting(d);
            self.arm();
            return;
        };
        let delta = at.saturating_duration_since(last);
        d.holes_seen = d.holes_seen.saturating_add(1);

        if !self.boundary.is_some_and(|b| b.is_gap(delta)) {
            if d.holes_seen > NUM_HOLES + 1 {
                self.set_drive(Drive::Stop);
                tracing::warn!(holes = d.holes_seen, "no gap found in a full turn");
                self.complete(None);
                return;
            }
            d.last_edge = Some(at);
            self.state = ActuatorState::Detecting(d);
            self.arm();
            return;
        }

        // Gap crossed: the ear sits on the first hole after it in the
        // direction of travel.
        let reference = match d.direction {
            Direction::Forward => 0,
            Direction::Backward => i32::from(NUM_HOLES) - 1,
        };
        let here = self.map.to_position(reference);
        let delta = match d.post_action {
            PostAction::ReadPosition => {
                let start_raw = reference - d.direction.sign() * i32::from(d.holes_seen);
                let start = self.map.to_position(start_raw);
                tracing::debug!(%start, holes = d.holes_seen, "gap found, returning");
                self.post(Reading::Position(Some(start)));
                minimal_delta(start_raw - reference)
            }
            PostAction::GotoPosition(target) => {
                tracing::debug!(%target, holes = d.holes_seen, "gap found");
                minimal_delta(self.map.to_raw(target) - reference)
            }
        };
        self.enter_running(Some(here), delta);
    }

    fn edge_idle(&mut self, position: Option<Position>) {
        if let Some(position) = position {
            tracing::info!(%position, "ear moved by hand");
        }
        self.state = ActuatorState::Idle { position: None };
        if self.mailbox.post_moved() {
            self.reported = true;
        }
    }

    fn edge_running(&mut self, mut r: Running) {
        if r.remaining_steps == 0 {
            return;
        }
        if !r.correcting {
            r.position = r.position.map(|p| p.step(r.direction));
        }
        r.remaining_steps -= 1;
        if r.remaining_steps > 0 {
            self.state = ActuatorState::Running(r);
            self.arm();
            return;
        }

        self.set_drive(Drive::Stop);
        if !r.correcting && self.encoder_high() {
            tracing::debug!("stopped past the hole, stepping back");
            r.correcting = true;
            r.direction = r.direction.opposite();
            r.remaining_steps = 1;
            self.state = ActuatorState::Running(r);
            self.set_drive(r.direction.drive());
            self.arm();
            return;
        }
        self.complete(r.position);
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Effective position for a command issued in `Idle`: a high encoder
    /// line means the ear was turned by hand since it last stopped.
    fn resolve_position(&mut self) -> Option<Position> {
        let ActuatorState::Idle { position } = self.state else {
            return None;
        };
        if self.encoder_high() {
            if position.is_some() {
                tracing::info!("ear left its hole while idle");
            }
            self.state = ActuatorState::Idle { position: None };
            if self.mailbox.post_moved() {
                self.reported = true;
            }
            return None;
        }
        position
    }

    fn goto(&mut self, position: Option<Position>, target: Position, direction: Direction) {
        match position {
            None => self.enter_detecting(PostAction::GotoPosition(target), direction),
            Some(from) => {
                let delta = match direction {
                    Direction::Forward => forward_delta(from, target),
                    Direction::Backward => backward_delta(from, target),
                };
                self.enter_running(Some(from), delta);
            }
        }
    }

    fn enter_running(&mut self, position: Option<Position>, delta: i32) {
        let Some(direction) = Direction::of(delta) else {
            self.complete(position);
            return;
        };
        let remaining_steps = u8::try_from(delta.unsigned_abs()).unwrap_or(u8::MAX);
        self.state = ActuatorState::Running(Running {
            position,
            direction,
            remaining_steps,
            correcting: false,
        });
        self.set_drive(direction.drive());
        self.arm();
    }

    fn enter_detecting(&mut self, post_action: PostAction, direction: Direction) {
        let last_edge = (!self.encoder_high()).then(|| self.clock.now());
        self.state = ActuatorState::Detecting(Detecting {
            post_action,
            direction,
            holes_seen: 0,
            last_edge,
        });
        self.set_drive(direction.drive());
        self.arm();
    }

    /// Stop and settle in `Idle`, refreshing a pending reading.
    fn complete(&mut self, position: Option<Position>) {
        if self.drive != Drive::Stop {
            self.set_drive(Drive::Stop);
        }
        self.watchdog.disarm();
        self.refresh(position);
        self.state = ActuatorState::Idle { position };
    }

    fn enter_broken(&mut self, kind: FaultKind) {
        self.watchdog.disarm();
        self.fault = Some(kind);
        self.state = ActuatorState::Broken;
        self.reported = true;
        tracing::error!(fault = %kind, "ear is broken");
    }

    fn finish(&mut self) -> Wake {
        if let Some(err) = self.hw_fault.take() {
            if !self.is_broken() {
                self.stop_motor();
                self.last_error = Some(err);
                self.enter_broken(FaultKind::Hardware);
            }
        }
        Wake {
            settled: self.state.is_settled(),
            reported: std::mem::take(&mut self.reported),
            rearmed: std::mem::take(&mut self.rearmed),
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn arm(&mut self) {
        self.watchdog.arm(self.clock.now());
        self.rearmed = true;
    }

    fn post(&mut self, reading: Reading) {
        self.mailbox.post(reading);
        self.reported = true;
    }

    fn refresh(&mut self, position: Option<Position>) {
        if self.mailbox.refresh(position) {
            self.reported = true;
        }
    }

    fn set_drive(&mut self, drive: Drive) {
        match self.motor.drive(drive) {
            Ok(()) => self.drive = drive,
            Err(e) => self.record_hw(&*e),
        }
    }

    /// Encoder level; a read failure is recorded and reads as low.
    fn encoder_high(&mut self) -> bool {
        match self.encoder.is_high() {
            Ok(high) => high,
            Err(e) => {
                self.record_hw(&*e);
                false
            }
        }
    }

    fn record_hw(&mut self, e: &(dyn std::error::Error + 'static)) {
        let mapped = map_hw_error(e);
        tracing::error!(error = %mapped, state = self.state.name(), "hardware error");
        if self.hw_fault.is_none() {
            self.hw_fault = Some(mapped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FixedEncoder, RecordingMotor};
    use ears_traits::ManualClock;

    type Machine = EarMachine<RecordingMotor, FixedEncoder, ManualClock>;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn machine() -> (Machine, RecordingMotor, FixedEncoder, ManualClock) {
        let motor = RecordingMotor::new();
        let encoder = FixedEncoder::new();
        let clock = ManualClock::new();
        let m = EarMachine::new(
            motor.clone(),
            encoder.clone(),
            clock.clone(),
            EarConfig::default(),
        );
        (m, motor, encoder, clock)
    }

    fn edge_after(m: &mut Machine, clock: &ManualClock, d: Duration) -> Wake {
        clock.advance(d);
        m.on_edge(clock.now())
    }

    /// Feed a full calibration that ends on raw hole `forward_hole`.
    fn calibrate(m: &mut Machine, clock: &ManualClock, forward_hole: u8) {
        let _ = m.begin();
        let _ = edge_after(m, clock, ms(50));
        let gap_index = usize::from(16 - forward_hole);
        for i in 0..DELTA_COUNT {
            let _ = edge_after(m, clock, if i == gap_index { ms(750) } else { ms(200) });
        }
        let back = if forward_hole == 0 { ms(680) } else { ms(130) };
        let _ = edge_after(m, clock, back);
    }

    #[test]
    fn calibration_lands_one_hole_behind_forward_sweep() {
        let (mut m, motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        assert_eq!(m.state(), ActuatorState::Idle { position: Position::new(4) });
        assert_eq!(m.boundary().map(|b| b.get()), Some(ms(475)));
        assert_eq!(motor.last(), Drive::Stop);
        assert!(m.watchdog_deadline().is_none());
    }

    #[test]
    fn calibration_on_hole_zero_wraps_to_sixteen() {
        let (mut m, _motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 0);
        assert_eq!(m.position(), Position::new(16));
    }

    #[test]
    fn fast_backward_step_after_hole_zero_is_a_mismatch() {
        let (mut m, _motor, _enc, clock) = machine();
        let _ = m.begin();
        let _ = edge_after(&mut m, &clock, ms(10));
        for i in 0..DELTA_COUNT {
            let _ = edge_after(&mut m, &clock, if i == 16 { ms(750) } else { ms(200) });
        }
        let wake = edge_after(&mut m, &clock, ms(130));
        assert!(wake.settled && wake.reported);
        assert!(m.is_broken());
        assert_eq!(m.fault(), Some(FaultKind::DirectionMismatch));
    }

    #[test]
    fn backward_step_is_timed_from_the_edge_not_its_handling() {
        let (mut m, _motor, _enc, clock) = machine();
        let _ = m.begin();
        let _ = edge_after(&mut m, &clock, ms(10));
        for _ in 0..DELTA_COUNT - 1 {
            let _ = edge_after(&mut m, &clock, ms(200));
        }
        // The gap edge is handled 300 ms after it happened.
        clock.advance(ms(750));
        let at = clock.now();
        clock.advance(ms(300));
        let _ = m.on_edge(at);
        assert_eq!(m.boundary().map(|b| b.get()), Some(ms(475)));

        let _ = edge_after(&mut m, &clock, ms(380));
        assert!(!m.is_broken());
        assert_eq!(m.position(), Position::new(16));
    }

    #[test]
    fn ambiguous_gap_breaks_the_ear() {
        let (mut m, motor, _enc, clock) = machine();
        let _ = m.begin();
        let _ = edge_after(&mut m, &clock, ms(10));
        for _ in 0..DELTA_COUNT {
            let _ = edge_after(&mut m, &clock, ms(200));
        }
        assert_eq!(m.fault(), Some(FaultKind::CalibrationAmbiguous));
        assert_eq!(motor.last(), Drive::Stop);
        assert_eq!(m.execute(Command::Nop), Err(EarError::Broken));
    }

    #[test]
    fn watchdog_during_calibration_breaks_the_ear() {
        let (mut m, motor, _enc, clock) = machine();
        let _ = m.begin();
        clock.advance(ms(3999));
        assert!(!m.check_watchdog().settled);
        clock.advance(ms(1));
        let wake = m.check_watchdog();
        assert!(wake.settled);
        assert_eq!(m.fault(), Some(FaultKind::WatchdogTimeout));
        assert_eq!(motor.last(), Drive::Stop);
    }

    #[test]
    fn watchdog_while_running_forgets_position() {
        let (mut m, motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        let _ = m.execute(Command::Forward(5)).unwrap();
        let _ = edge_after(&mut m, &clock, ms(200));
        let _ = edge_after(&mut m, &clock, ms(200));
        assert!(matches!(
            m.state(),
            ActuatorState::Running(Running { remaining_steps: 3, .. })
        ));
        clock.advance(ms(4000));
        let wake = m.check_watchdog();
        assert!(wake.settled);
        assert_eq!(m.state(), ActuatorState::Idle { position: None });
        assert_eq!(motor.last(), Drive::Stop);
        assert!(!m.is_broken());
    }

    #[test]
    fn rearming_on_edges_postpones_the_watchdog() {
        let (mut m, _motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        let _ = m.execute(Command::Forward(3)).unwrap();
        let _ = edge_after(&mut m, &clock, ms(3000));
        clock.advance(ms(3000));
        let _ = m.check_watchdog();
        assert!(matches!(m.state(), ActuatorState::Running(_)));
    }

    #[test]
    fn query_while_unknown_reports_minus_one_and_stays_put() {
        let (mut m, motor, _enc, _clock) = machine();
        let wake = m.execute(Command::Query).unwrap();
        assert!(wake.reported && wake.settled);
        assert_eq!(m.take_reading(), Some(Reading::Position(None)));
        assert_eq!(m.state(), ActuatorState::Idle { position: None });
        assert!(motor.drives().is_empty());
    }

    #[test]
    fn goto_same_position_does_not_move() {
        let (mut m, motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        let writes = motor.drives().len();
        let wake = m.execute(Command::GotoBackward(4)).unwrap();
        assert!(wake.settled);
        assert_eq!(m.position(), Position::new(4));
        // Only a redundant stop, never a drive.
        assert!(motor.drives()[writes..].iter().all(|d| *d == Drive::Stop));
    }

    #[test]
    fn edge_while_idle_means_moved_by_hand() {
        let (mut m, _motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        let wake = edge_after(&mut m, &clock, ms(1));
        assert!(wake.reported);
        assert_eq!(m.position(), None);
        assert_eq!(m.take_reading(), Some(Reading::Moved));
    }

    #[test]
    fn high_encoder_when_idle_resolves_to_moved() {
        let (mut m, _motor, enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        enc.set_high(true);
        let _ = m.execute(Command::Nop).unwrap();
        assert_eq!(m.position(), None);
        assert_eq!(m.pending(), Some(Reading::Moved));
    }

    #[test]
    fn high_encoder_reports_moved_even_when_already_unknown() {
        let (mut m, _motor, enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        enc.set_high(true);
        let _ = m.execute(Command::Nop).unwrap();
        assert_eq!(m.take_reading(), Some(Reading::Moved));

        let wake = m.execute(Command::Nop).unwrap();
        assert!(wake.reported);
        assert_eq!(m.position(), None);
        assert_eq!(m.take_reading(), Some(Reading::Moved));
    }

    #[test]
    fn busy_outside_idle_but_query_answers() {
        let (mut m, _motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        let _ = m.execute(Command::Backward(2)).unwrap();
        assert_eq!(m.execute(Command::Forward(1)), Err(EarError::Busy("running")));
        let _ = m.execute(Command::Query).unwrap();
        assert_eq!(m.take_reading(), Some(Reading::Position(Position::new(4))));
    }

    #[test]
    fn motor_failure_breaks_the_ear() {
        let (mut m, motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        motor.set_failing(true);
        let err = m.execute(Command::Forward(1)).unwrap_err();
        assert_eq!(err, EarError::Hardware("motor line stuck".into()));
        assert!(m.is_broken());
        assert_eq!(m.fault(), Some(FaultKind::Hardware));
    }

    #[test]
    fn encoder_failure_during_command_breaks_the_ear() {
        let (mut m, _motor, enc, clock) = machine();
        calibrate(&mut m, &clock, 5);
        enc.set_failing(true);
        assert!(m.execute(Command::Nop).is_err());
        assert!(m.is_broken());
    }

    #[test]
    fn snapshot_reflects_state() {
        let (mut m, _motor, _enc, clock) = machine();
        calibrate(&mut m, &clock, 9);
        let s = m.snapshot();
        assert_eq!(s.state, "idle");
        assert_eq!(s.position, Position::new(8));
        assert_eq!(s.edges, 19);
        assert!(!s.watchdog_armed);
    }
}
