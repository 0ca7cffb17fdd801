//! Chord deduplication and time quantization

use super::chord::{sort_pitches, Chord, TimedChord};

/// Merges repeated pitch sets and quantizes durations to a backend's grid.
///
/// One chord is held back until the pitch set changes, so consecutive
/// outputs never share a pitch set. Rounding error is carried into the next
/// duration, keeping cumulative drift within half a grid unit.
#[derive(Debug, Clone)]
pub struct DedupEngine {
    grid: Option<u64>,
    monophonic: bool,
    held: Vec<f64>,
    held_duration: u64,
    /// Unquantized minus quantized time so far
    error: i64,
}

impl DedupEngine {
    pub fn new(grid: Option<u64>, monophonic: bool) -> Self {
        Self {
            grid: grid.filter(|&g| g > 0),
            monophonic,
            held: Vec::new(),
            held_duration: 0,
            error: 0,
        }
    }

    /// Current rounding-error carry in microseconds
    pub fn error(&self) -> i64 {
        self.error
    }

    fn shape(&self, mut pitches: Vec<f64>) -> Vec<f64> {
        if self.monophonic {
            if let Some(top) = pitches.iter().copied().max_by(|a, b| a.total_cmp(b)) {
                return vec![top];
            }
        }
        sort_pitches(&mut pitches);
        pitches
    }

    /// Round `duration` plus the carried error to the nearest grid multiple
    fn quantize(&mut self, duration: u64) -> u64 {
        let Some(grid) = self.grid else {
            return duration;
        };
        let grid = grid as i64;
        let value = duration as i64 + self.error;
        let rounded = (value + grid / 2).div_euclid(grid) * grid;
        self.error = value - rounded;
        rounded.max(0) as u64
    }

    /// Feed one timed chord; returns the previously held chord if it is now complete
    pub fn push(&mut self, chord: TimedChord) -> Option<Chord> {
        let pitches = self.shape(chord.pitches);
        let duration = self.quantize(chord.duration);

        if duration == 0 {
            // Too short for the grid; the held chord stays so a roll can resume it
            return None;
        }
        if pitches == self.held {
            self.held_duration += duration;
            return None;
        }
        let out = self.take_held();
        self.held = pitches;
        self.held_duration = duration;
        out
    }

    /// End of stream: release the held chord
    pub fn flush(&mut self) -> Option<Chord> {
        let out = self.take_held();
        self.held.clear();
        out
    }

    fn take_held(&mut self) -> Option<Chord> {
        if self.held_duration == 0 {
            return None;
        }
        let duration = std::mem::take(&mut self.held_duration);
        Some(Chord {
            pitches: self.held.clone(),
            duration,
        })
    }
}
