//! Chord types passed between pipeline stages

use serde::Serialize;

/// Sounding pitches over one time advance, before deduplication.
///
/// Pitches are MIDI note numbers, fractional when a channel is bent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedChord {
    pub pitches: Vec<f64>,
    /// Microseconds; may be zero
    pub duration: u64,
}

impl TimedChord {
    pub fn new(pitches: Vec<f64>, duration: u64) -> Self {
        Self { pitches, duration }
    }
}

/// A deduplicated, quantized chord ready for a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chord {
    /// Sorted ascending, no duplicates
    pub pitches: Vec<f64>,
    /// Microseconds, always > 0
    pub duration: u64,
}

/// Sort pitches ascending and drop duplicates
pub fn sort_pitches(pitches: &mut Vec<f64>) {
    pitches.sort_by(|a, b| a.total_cmp(b));
    pitches.dedup();
}

/// Round a pitch to the nearest note number, halves rounding up
pub fn round_pitch(pitch: f64) -> i32 {
    (pitch + 0.5).floor() as i32
}

/// Integer note numbers for backends without fractional pitch.
///
/// Output is ascending and free of duplicates.
pub fn note_numbers(pitches: &[f64]) -> Vec<i32> {
    let mut notes: Vec<i32> = pitches.iter().map(|&p| round_pitch(p)).collect();
    notes.sort_unstable();
    notes.dedup();
    notes
}
