//! Standard MIDI File writer

use super::events::{meta, status};
use super::parser::{HEADER_MAGIC, TRACK_MAGIC};

/// Append a variable-length quantity
pub fn write_var_len(out: &mut Vec<u8>, value: u32) {
    let value = value & 0x0FFF_FFFF;
    let mut groups = [0u8; 4];
    let mut count = 0;
    let mut v = value;
    loop {
        groups[count] = (v & 0x7F) as u8;
        count += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let more = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | more);
    }
}

/// In-memory MIDI file writer.
///
/// Events are buffered per track; `end_track` appends the finished chunk.
pub struct SmfWriter {
    data: Vec<u8>,
    track: Vec<u8>,
    delta: u32,
}

impl SmfWriter {
    /// Start a file with the given format, track count and ticks per quarter note
    pub fn new(format: u16, track_count: u16, division: u16) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(HEADER_MAGIC);
        data.extend_from_slice(&6u32.to_be_bytes());
        data.extend_from_slice(&format.to_be_bytes());
        data.extend_from_slice(&track_count.to_be_bytes());
        data.extend_from_slice(&division.to_be_bytes());
        Self {
            data,
            track: Vec::new(),
            delta: 0,
        }
    }

    /// Begin buffering a new track
    pub fn start_track(&mut self) {
        self.track.clear();
        self.delta = 0;
    }

    /// Advance time before the next event
    pub fn delay(&mut self, ticks: u32) {
        self.delta += ticks;
    }

    fn event(&mut self, bytes: &[u8]) {
        write_var_len(&mut self.track, self.delta);
        self.track.extend_from_slice(bytes);
        self.delta = 0;
    }

    pub fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        self.event(&[status::NOTE_ON | (channel & 0x0F), key, velocity]);
    }

    pub fn note_off(&mut self, channel: u8, key: u8, velocity: u8) {
        self.event(&[status::NOTE_OFF | (channel & 0x0F), key, velocity]);
    }

    pub fn controller(&mut self, channel: u8, controller: u8, value: u8) {
        self.event(&[status::CONTROLLER | (channel & 0x0F), controller, value]);
    }

    pub fn program_change(&mut self, channel: u8, program: u8) {
        self.event(&[status::PROGRAM_CHANGE | (channel & 0x0F), program]);
    }

    /// Pitch bend with a 14-bit value (8192 = centre)
    pub fn pitch_bend(&mut self, channel: u8, value: u16) {
        self.event(&[
            status::PITCH_BEND | (channel & 0x0F),
            (value & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
        ]);
    }

    /// Tempo in microseconds per quarter note
    pub fn tempo(&mut self, micros_per_quarter: u32) {
        self.event(&[
            status::META,
            meta::TEMPO,
            3,
            (micros_per_quarter >> 16) as u8,
            (micros_per_quarter >> 8) as u8,
            micros_per_quarter as u8,
        ]);
    }

    /// Write end-of-track and append the chunk to the file
    pub fn end_track(&mut self) {
        self.event(&[status::META, meta::END_OF_TRACK, 0]);
        self.data.extend_from_slice(TRACK_MAGIC);
        self.data
            .extend_from_slice(&(self.track.len() as u32).to_be_bytes());
        self.data.extend_from_slice(&self.track);
        self.track.clear();
    }

    /// Get the finished file bytes
    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
