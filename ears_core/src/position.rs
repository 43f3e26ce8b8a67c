//! Position arithmetic over the 17 holes of the encoder disc.
//!
//! Two index spaces exist. A *raw* hole index counts holes from the first
//! hole after the gap when turning forward; that is what the gap detection
//! measures. A [`Position`] is what callers see: the raw index shifted so
//! that the configured reference hole reads as 0. [`HoleMap`] converts
//! between the two.

use std::fmt;

use ears_traits::Drive;

/// Holes on the encoder disc, the one after the gap included.
pub const NUM_HOLES: u8 = 17;

const HOLES: i32 = NUM_HOLES as i32;

/// Position of the ear, always in `[0, 17)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(u8);

impl Position {
    pub const ZERO: Position = Position(0);

    /// `None` when `value` is not a valid hole index.
    #[inline]
    pub fn new(value: u8) -> Option<Self> {
        (value < NUM_HOLES).then_some(Self(value))
    }

    /// Fold any integer into `[0, 17)` (Euclidean remainder).
    #[inline]
    pub fn wrapping(value: i32) -> Self {
        Self(value.rem_euclid(HOLES) as u8)
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Position after one hole in `direction`.
    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        self.offset(direction.sign())
    }

    #[inline]
    pub fn offset(self, delta: i32) -> Self {
        Self::wrapping(i32::from(self.0) + delta)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    #[inline]
    pub fn drive(self) -> Drive {
        match self {
            Direction::Forward => Drive::Forward,
            Direction::Backward => Drive::Backward,
        }
    }

    /// Direction of a signed move; `None` for zero.
    #[inline]
    pub fn of(delta: i32) -> Option<Self> {
        match delta.signum() {
            1 => Some(Direction::Forward),
            -1 => Some(Direction::Backward),
            _ => None,
        }
    }
}

/// Steps needed to reach `to` turning forward only, in `[0, 17)`.
#[inline]
pub fn forward_delta(from: Position, to: Position) -> i32 {
    (i32::from(to.0) - i32::from(from.0)).rem_euclid(HOLES)
}

/// Signed steps needed to reach `to` turning backward only, in `(-17, 0]`.
#[inline]
pub fn backward_delta(from: Position, to: Position) -> i32 {
    -(i32::from(from.0) - i32::from(to.0)).rem_euclid(HOLES)
}

/// Shortest signed move equivalent to `delta` modulo 17, in `[-8, 8]`.
#[inline]
pub fn minimal_delta(delta: i32) -> i32 {
    let d = delta.rem_euclid(HOLES);
    if d > HOLES / 2 { d - HOLES } else { d }
}

/// Conversion between raw hole indices and reported positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoleMap {
    reference_hole: u8,
}

impl HoleMap {
    /// `reference_hole` is the raw index that reads as position 0; it is
    /// taken modulo 17.
    pub fn new(reference_hole: u8) -> Self {
        Self {
            reference_hole: reference_hole % NUM_HOLES,
        }
    }

    #[inline]
    pub fn reference_hole(&self) -> u8 {
        self.reference_hole
    }

    #[inline]
    pub fn to_position(&self, raw: i32) -> Position {
        Position::wrapping(raw - i32::from(self.reference_hole))
    }

    #[inline]
    pub fn to_raw(&self, position: Position) -> i32 {
        (i32::from(position.0) + i32::from(self.reference_hole)).rem_euclid(HOLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn p(v: u8) -> Position {
        Position::new(v).unwrap()
    }

    #[test]
    fn wrapping_folds_negative_and_large_values() {
        assert_eq!(Position::wrapping(-1), p(16));
        assert_eq!(Position::wrapping(17), p(0));
        assert_eq!(Position::wrapping(35), p(1));
        assert!(Position::new(17).is_none());
    }

    #[test]
    fn step_wraps_both_ways() {
        assert_eq!(p(16).step(Direction::Forward), p(0));
        assert_eq!(p(0).step(Direction::Backward), p(16));
    }

    #[rstest]
    #[case(3, 5, 2, -15)]
    #[case(5, 3, 15, -2)]
    #[case(7, 7, 0, 0)]
    #[case(16, 0, 1, -16)]
    fn directional_deltas(
        #[case] from: u8,
        #[case] to: u8,
        #[case] fwd: i32,
        #[case] bwd: i32,
    ) {
        assert_eq!(forward_delta(p(from), p(to)), fwd);
        assert_eq!(backward_delta(p(from), p(to)), bwd);
    }

    #[test]
    fn minimal_delta_stays_within_half_a_turn() {
        for d in -60..60 {
            let m = minimal_delta(d);
            assert!((-8..=8).contains(&m), "{d} -> {m}");
            assert_eq!((d - m).rem_euclid(17), 0, "{d} -> {m}");
        }
        assert_eq!(minimal_delta(9), -8);
        assert_eq!(minimal_delta(8), 8);
        assert_eq!(minimal_delta(-9), 8);
    }

    #[test]
    fn hole_map_round_trips_with_reference() {
        let map = HoleMap::new(3);
        assert_eq!(map.to_position(3), Position::ZERO);
        assert_eq!(map.to_position(0), p(14));
        for v in 0..17 {
            assert_eq!(map.to_position(map.to_raw(p(v))), p(v));
        }
    }
}
