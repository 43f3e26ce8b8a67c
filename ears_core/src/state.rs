//! Per-ear state: one variant active at a time, replaced wholesale on every
//! transition.

use std::time::{Duration, Instant};

use crate::calibration::DELTA_COUNT;
use crate::position::{Direction, Position};

/// What a detection sweep does once the gap is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    GotoPosition(Position),
    ReadPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Testing {
    /// Deltas recorded so far (the synchronising first edge excluded).
    pub holes_seen: u8,
    pub last_edge: Option<Instant>,
    pub hole_deltas: [Duration; DELTA_COUNT],
    /// Raw hole reached by the forward sweep; set once the sweep is analysed
    /// and the backward validation step is under way.
    pub forward_hole: Option<u8>,
}

impl Default for Testing {
    fn default() -> Self {
        Self {
            holes_seen: 0,
            last_edge: None,
            hole_deltas: [Duration::ZERO; DELTA_COUNT],
            forward_hole: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detecting {
    pub post_action: PostAction,
    pub direction: Direction,
    pub holes_seen: u8,
    /// `None` when the sweep started between two holes.
    pub last_edge: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Running {
    pub position: Option<Position>,
    pub direction: Direction,
    pub remaining_steps: u8,
    /// Set during the single corrective step after an inertial overrun.
    pub correcting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Testing(Testing),
    Detecting(Detecting),
    Idle { position: Option<Position> },
    Running(Running),
    Broken,
}

impl ActuatorState {
    pub fn name(&self) -> &'static str {
        match self {
            ActuatorState::Testing(_) => "testing",
            ActuatorState::Detecting(_) => "detecting",
            ActuatorState::Idle { .. } => "idle",
            ActuatorState::Running(_) => "running",
            ActuatorState::Broken => "broken",
        }
    }

    /// Idle or Broken: the command path may proceed.
    #[inline]
    pub fn is_settled(&self) -> bool {
        matches!(self, ActuatorState::Idle { .. } | ActuatorState::Broken)
    }

    /// The watchdog must be armed exactly while this holds.
    #[inline]
    pub fn expects_edges(&self) -> bool {
        match self {
            ActuatorState::Testing(_) | ActuatorState::Detecting(_) => true,
            ActuatorState::Running(r) => r.remaining_steps > 0,
            ActuatorState::Idle { .. } | ActuatorState::Broken => false,
        }
    }

    /// Tracked position, where the state has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            ActuatorState::Idle { position } => *position,
            ActuatorState::Running(r) => r.position,
            _ => None,
        }
    }
}
