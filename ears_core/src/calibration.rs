//! Encoder geometry derived from one timed revolution.
//!
//! A full forward turn yields 17 inter-edge deltas: 16 ordinary ones and the
//! gap. The gap must stand out by at least half of the largest ordinary
//! delta; the midpoint between the two then separates "gap" from "hole" for
//! the controller's lifetime.

use std::time::Duration;

use thiserror::Error;

use crate::position::NUM_HOLES;

/// Deltas recorded during the calibration sweep.
pub const DELTA_COUNT: usize = NUM_HOLES as usize;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("gap is not obvious (max = {max:?}, gap = {gap:?})")]
    Ambiguous { max: Duration, gap: Duration },
    #[error("incoherent backward delta {delta:?} against boundary {boundary:?} (gap expected: {expected_gap})")]
    DirectionMismatch {
        delta: Duration,
        boundary: Duration,
        expected_gap: bool,
    },
}

/// Time threshold separating an ordinary inter-hole delta from the gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalibrationBoundary(Duration);

impl CalibrationBoundary {
    pub fn new(boundary: Duration) -> Self {
        Self(boundary)
    }

    #[inline]
    pub fn get(&self) -> Duration {
        self.0
    }

    #[inline]
    pub fn is_gap(&self, delta: Duration) -> bool {
        delta > self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapAnalysis {
    /// Largest delta.
    pub gap: Duration,
    /// Largest ordinary delta.
    pub max: Duration,
    /// Smallest delta.
    pub min: Duration,
    /// Index of the gap delta in the sweep.
    pub gap_index: usize,
}

impl GapAnalysis {
    pub fn from_deltas(deltas: &[Duration; DELTA_COUNT]) -> Result<Self, CalibrationError> {
        let (gap_index, gap) = deltas
            .iter()
            .copied()
            .enumerate()
            .fold((0, Duration::ZERO), |best, (i, d)| {
                if d > best.1 { (i, d) } else { best }
            });
        let max = deltas
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != gap_index)
            .map(|(_, d)| *d)
            .max()
            .unwrap_or_default();
        let min = deltas.iter().copied().min().unwrap_or_default();

        if gap < max + max / 2 {
            return Err(CalibrationError::Ambiguous { max, gap });
        }
        Ok(Self {
            gap,
            max,
            min,
            gap_index,
        })
    }

    pub fn boundary(&self) -> CalibrationBoundary {
        CalibrationBoundary((self.max + self.gap) / 2)
    }

    /// Raw hole index under the sensor when the sweep ended.
    ///
    /// The sweep ends one hole after the one that started the gap delta
    /// count; a gap in the last slot means the ear stopped on hole 0.
    pub fn forward_hole(&self) -> u8 {
        (DELTA_COUNT - 1 - self.gap_index) as u8
    }
}

/// Check the single backward step that follows the forward sweep.
///
/// Stopped on hole 0 the step crosses the gap and must be slower than the
/// boundary; anywhere else it must be faster.
pub fn validate_backward(
    forward_hole: u8,
    delta: Duration,
    boundary: CalibrationBoundary,
) -> Result<(), CalibrationError> {
    let expected_gap = forward_hole == 0;
    if boundary.is_gap(delta) == expected_gap {
        Ok(())
    } else {
        Err(CalibrationError::DirectionMismatch {
            delta,
            boundary: boundary.get(),
            expected_gap,
        })
    }
}
