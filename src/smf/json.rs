//! JSON serialization types for decoded MIDI data

use super::events::TrackEvent;
use super::parser::{Header, Smf};
use crate::convert::chord::Chord;
use serde::Serialize;

/// Top-level JSON structure for a decoded file
#[derive(Debug, Clone, Serialize)]
pub struct SmfJson<'a> {
    pub header: &'a Header,
    pub tracks: Vec<TrackJson<'a>>,
}

/// JSON representation of one track
#[derive(Debug, Clone, Serialize)]
pub struct TrackJson<'a> {
    pub index: usize,
    /// Sum of all delta times in the track
    pub total_ticks: u64,
    pub events: &'a [TrackEvent],
}

impl<'a> SmfJson<'a> {
    pub fn new(smf: &'a Smf) -> Self {
        let tracks = smf
            .tracks
            .iter()
            .enumerate()
            .map(|(index, events)| TrackJson {
                index,
                total_ticks: events.iter().map(|e| e.delta as u64).sum(),
                events,
            })
            .collect();
        Self {
            header: &smf.header,
            tracks,
        }
    }
}

/// JSON structure for a deduplicated chord stream
#[derive(Debug, Clone, Serialize)]
pub struct ChordsJson {
    /// Total duration in microseconds
    pub total_micros: u64,
    pub chords: Vec<Chord>,
}

impl ChordsJson {
    pub fn new(chords: Vec<Chord>) -> Self {
        Self {
            total_micros: chords.iter().map(|c| c.duration).sum(),
            chords,
        }
    }
}
