//! Decoded MIDI event definitions

use serde::Serialize;

/// Status bytes and meta event types
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const KEY_PRESSURE: u8 = 0xA0;
    pub const CONTROLLER: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
    pub const SYSEX: u8 = 0xF0;
    pub const SYSEX_ESCAPE: u8 = 0xF7;
    pub const META: u8 = 0xFF;
}

/// Meta event types
pub mod meta {
    pub const TEMPO: u8 = 0x51;
    pub const END_OF_TRACK: u8 = 0x2F;
}

/// Controller numbers used for pitch-bend range registration
pub mod controller {
    pub const DATA_ENTRY: u8 = 6;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;
}

/// Percussion channel (MIDI channel 10)
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Number of data bytes following a channel status byte
pub fn channel_data_size(status: u8) -> usize {
    match status & 0xF0 {
        status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}

/// Number of data bytes following a system common status byte
pub fn system_data_size(status: u8) -> usize {
    match status {
        0xF1 | 0xF3 => 1,
        0xF2 => 2,
        _ => 0,
    }
}

/// A low-level decoded unit, before interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent<'a> {
    pub delta: u32,
    pub status: u8,
    pub channel: u8,
    pub data: &'a [u8],
}

/// An interpreted MIDI message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Note on (velocity is never 0; zero-velocity note-ons become note-offs)
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    KeyPressure { channel: u8, key: u8, pressure: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// Pitch bend, both 7-bit halves as stored in the file
    PitchBend { channel: u8, lsb: u8, msb: u8 },
    /// Set tempo, in microseconds per quarter note
    Tempo { micros_per_quarter: u32 },
    EndOfTrack,
    /// Any other meta event (skipped)
    Meta { meta_type: u8, len: usize },
    /// System exclusive block (skipped)
    SysEx { len: usize },
    /// System common / real-time message (skipped)
    System { status: u8 },
}

impl Message {
    /// Interpret a channel message; `None` when the status is not a channel status
    pub fn from_channel(raw: &RawEvent<'_>) -> Option<Self> {
        let channel = raw.channel;
        let d0 = raw.data.first().copied().unwrap_or(0);
        let d1 = raw.data.get(1).copied().unwrap_or(0);
        let message = match raw.status & 0xF0 {
            status::NOTE_ON if d1 == 0 => Message::NoteOff { channel, key: d0 },
            status::NOTE_ON => Message::NoteOn {
                channel,
                key: d0,
                velocity: d1,
            },
            status::NOTE_OFF => Message::NoteOff { channel, key: d0 },
            status::KEY_PRESSURE => Message::KeyPressure {
                channel,
                key: d0,
                pressure: d1,
            },
            status::CONTROLLER => Message::Controller {
                channel,
                controller: d0,
                value: d1,
            },
            status::PROGRAM_CHANGE => Message::ProgramChange {
                channel,
                program: d0,
            },
            status::CHANNEL_PRESSURE => Message::ChannelPressure {
                channel,
                pressure: d0,
            },
            status::PITCH_BEND => Message::PitchBend {
                channel,
                lsb: d0,
                msb: d1,
            },
            _ => return None,
        };
        Some(message)
    }

    /// Interpret a meta event
    pub fn from_meta(meta_type: u8, data: &[u8]) -> Self {
        match meta_type {
            meta::TEMPO if data.len() >= 3 => Message::Tempo {
                micros_per_quarter: ((data[0] as u32) << 16)
                    | ((data[1] as u32) << 8)
                    | data[2] as u32,
            },
            meta::END_OF_TRACK => Message::EndOfTrack,
            _ => Message::Meta {
                meta_type,
                len: data.len(),
            },
        }
    }
}

/// A message with its delta time in ticks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackEvent {
    pub delta: u32,
    #[serde(flatten)]
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: u8, data: &[u8]) -> RawEvent<'_> {
        RawEvent {
            delta: 0,
            status,
            channel: status & 0x0F,
            data,
        }
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let msg = Message::from_channel(&raw(0x93, &[60, 0]));
        assert_eq!(msg, Some(Message::NoteOff { channel: 3, key: 60 }));
    }

    #[test]
    fn test_note_on() {
        let msg = Message::from_channel(&raw(0x90, &[64, 100]));
        assert_eq!(
            msg,
            Some(Message::NoteOn {
                channel: 0,
                key: 64,
                velocity: 100
            })
        );
    }

    #[test]
    fn test_pitch_bend_halves() {
        let msg = Message::from_channel(&raw(0xE1, &[0x11, 0x50]));
        assert_eq!(
            msg,
            Some(Message::PitchBend {
                channel: 1,
                lsb: 0x11,
                msb: 0x50
            })
        );
    }

    #[test]
    fn test_system_status_is_not_a_channel_message() {
        assert_eq!(Message::from_channel(&raw(0xF0, &[])), None);
        assert_eq!(Message::from_channel(&raw(0xF8, &[])), None);
        assert!(Message::from_channel(&raw(0xE0, &[0, 0x40])).is_some());
    }

    #[test]
    fn test_tempo_meta() {
        let msg = Message::from_meta(meta::TEMPO, &[0x07, 0xA1, 0x20]);
        assert_eq!(
            msg,
            Message::Tempo {
                micros_per_quarter: 500_000
            }
        );
        assert_eq!(
            Message::from_meta(0x03, b"Piano"),
            Message::Meta {
                meta_type: 0x03,
                len: 5
            }
        );
    }

    #[test]
    fn test_data_sizes() {
        assert_eq!(channel_data_size(0xC5), 1);
        assert_eq!(channel_data_size(0xD0), 1);
        assert_eq!(channel_data_size(0x90), 2);
        assert_eq!(channel_data_size(0xE0), 2);
        assert_eq!(system_data_size(0xF2), 2);
        assert_eq!(system_data_size(0xF3), 1);
        assert_eq!(system_data_size(0xF8), 0);
    }
}
