//! Per-channel note and pitch-bend state

use super::chord::sort_pitches;
use crate::smf::events::{controller, PERCUSSION_CHANNEL};

/// Number of MIDI channels
pub const CHANNEL_COUNT: usize = 16;

/// State of one MIDI channel
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Currently sounding keys, no duplicates
    pub held: Vec<u8>,
    /// Semitone offset from the last pitch bend
    pub bend_offset: f64,
    /// Pitch-bend range in semitones
    pub bend_range: u8,
    /// Last registered parameter number halves (controllers 101/100)
    pub rpn_msb: u8,
    pub rpn_lsb: u8,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            held: Vec::new(),
            bend_offset: 0.0,
            bend_range: 1,
            rpn_msb: 0,
            rpn_lsb: 0,
        }
    }
}

impl ChannelState {
    pub fn note_on(&mut self, key: u8) {
        if !self.held.contains(&key) {
            self.held.push(key);
        }
    }

    pub fn note_off(&mut self, key: u8) {
        self.held.retain(|&k| k != key);
    }

    /// Track the controllers that set the pitch-bend range; others are ignored
    pub fn controller(&mut self, number: u8, value: u8) {
        match number {
            controller::RPN_LSB => self.rpn_lsb = value,
            controller::RPN_MSB => self.rpn_msb = value,
            controller::DATA_ENTRY if self.rpn_msb == 0 && self.rpn_lsb == 0 => {
                self.bend_range = value;
            }
            _ => {}
        }
    }

    /// Apply a pitch bend.
    ///
    /// Only the most significant 7 bits are used, so the offset moves in
    /// steps of range/64 semitones.
    pub fn pitch_bend(&mut self, msb: u8) {
        self.bend_offset = (msb as f64 - 64.0) * self.bend_range as f64 / 64.0;
    }
}

/// All sixteen channels of one file
#[derive(Debug, Clone)]
pub struct Channels {
    channels: [ChannelState; CHANNEL_COUNT],
}

impl Channels {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| ChannelState::default()),
        }
    }

    pub fn get_mut(&mut self, channel: u8) -> &mut ChannelState {
        &mut self.channels[channel as usize & 0x0F]
    }

    /// Start a note; the percussion channel never sounds
    pub fn note_on(&mut self, channel: u8, key: u8) {
        if channel != PERCUSSION_CHANNEL {
            self.get_mut(channel).note_on(key);
        }
    }

    pub fn note_off(&mut self, channel: u8, key: u8) {
        self.get_mut(channel).note_off(key);
    }

    /// Release every held note, keeping bend state
    pub fn release_all(&mut self) {
        for channel in &mut self.channels {
            channel.held.clear();
        }
    }

    /// Union of all held pitches, each displaced by its channel's bend
    pub fn sounding(&self) -> Vec<f64> {
        let mut pitches: Vec<f64> = self
            .channels
            .iter()
            .flat_map(|c| c.held.iter().map(move |&k| k as f64 + c.bend_offset))
            .collect();
        sort_pitches(&mut pitches);
        pitches
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
