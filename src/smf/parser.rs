//! Standard MIDI File chunk and track parser

use super::events::{self, status, Message, RawEvent, TrackEvent};
use super::reader::ByteReader;
use crate::error::{Error, Result};
use serde::Serialize;

/// Header chunk tag
pub const HEADER_MAGIC: &[u8; 4] = b"MThd";

/// Track chunk tag
pub const TRACK_MAGIC: &[u8; 4] = b"MTrk";

/// Declared file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Format 0: one track
    SingleTrack,
    /// Format 1: simultaneous tracks sharing one timeline
    MultiTrack,
    /// Format 2: independent sequential patterns
    Sequential,
}

impl Format {
    pub fn from_word(word: u16) -> Result<Self> {
        match word {
            0 => Ok(Format::SingleTrack),
            1 => Ok(Format::MultiTrack),
            2 => Ok(Format::Sequential),
            _ => Err(Error::InvalidHeader(format!("unknown format {}", word))),
        }
    }
}

/// Time division declared in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Ticks per quarter note
    Metrical(u16),
    /// SMPTE frames per second and ticks per frame
    Timecode { fps: u8, subframes: u8 },
}

impl Timing {
    pub fn from_word(word: u16) -> Result<Self> {
        if word & 0x8000 != 0 {
            let fps = ((word >> 8) as u8 as i8).unsigned_abs();
            let subframes = (word & 0xFF) as u8;
            if fps == 0 || subframes == 0 {
                return Err(Error::InvalidHeader("zero SMPTE division".into()));
            }
            Ok(Timing::Timecode { fps, subframes })
        } else if word == 0 {
            Err(Error::InvalidHeader("zero ticks per quarter note".into()))
        } else {
            Ok(Timing::Metrical(word))
        }
    }
}

/// Parsed header chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub format: Format,
    pub track_count: u16,
    pub timing: Timing,
}

/// A fully decoded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Smf {
    pub header: Header,
    pub tracks: Vec<Vec<TrackEvent>>,
}

/// Per-track decoding state
#[derive(Debug, Default)]
struct TrackState {
    running_status: Option<u8>,
}

/// MIDI file parser
pub struct SmfParser<'a> {
    reader: ByteReader<'a>,
}

impl<'a> SmfParser<'a> {
    /// Create a new parser over raw file data
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data),
        }
    }

    /// Validate the header chunk and parse it
    pub fn parse_header(&mut self) -> Result<Header> {
        let magic = self.reader.slice(4)?;
        if magic != HEADER_MAGIC {
            return Err(Error::InvalidHeader("missing MThd tag".into()));
        }
        let len = self.reader.read_u32_be()? as usize;
        if len < 6 {
            return Err(Error::InvalidHeader(format!("header chunk too short ({})", len)));
        }
        let format = Format::from_word(self.reader.read_u16_be()?)?;
        let track_count = self.reader.read_u16_be()?;
        let timing = Timing::from_word(self.reader.read_u16_be()?)?;
        self.reader.skip(len - 6)?;

        tracing::debug!(?format, track_count, ?timing, "parsed MIDI header");
        Ok(Header {
            format,
            track_count,
            timing,
        })
    }

    /// Parse every declared track chunk, skipping chunks of unknown type
    pub fn parse_tracks(&mut self, header: &Header) -> Result<Vec<Vec<TrackEvent>>> {
        let mut tracks = Vec::with_capacity(header.track_count as usize);
        while tracks.len() < header.track_count as usize {
            let magic = self.reader.slice(4)?;
            let len = self.reader.read_u32_be()? as usize;
            let start = self.reader.position();
            let body = self.reader.slice(len)?;
            if magic != TRACK_MAGIC {
                tracing::debug!(
                    "skipping {} byte chunk {:?}",
                    len,
                    String::from_utf8_lossy(magic)
                );
                continue;
            }
            let index = tracks.len();
            tracks.push(Self::parse_track(body, index, start)?);
        }
        Ok(tracks)
    }

    /// Decode the events of one track chunk body.
    ///
    /// `base` is the file offset of the body, used for error reporting.
    fn parse_track(body: &[u8], index: usize, base: usize) -> Result<Vec<TrackEvent>> {
        let mut reader = ByteReader::new(body);
        let mut state = TrackState::default();
        let mut events = Vec::new();

        while !reader.is_eof() {
            let event = Self::parse_event(&mut reader, &mut state).map_err(|e| match e {
                Error::TruncatedInput { offset, .. } => Error::InvalidEventLength {
                    track: index,
                    offset: base + offset,
                },
                Error::MissingRunningStatus { offset } => Error::MissingRunningStatus {
                    offset: base + offset,
                },
                other => other,
            })?;
            events.push(event);
        }

        tracing::debug!(track = index, events = events.len(), "parsed track");
        Ok(events)
    }

    fn parse_event(reader: &mut ByteReader<'_>, state: &mut TrackState) -> Result<TrackEvent> {
        let delta = reader.read_var_len()?;

        let status = if reader.peek_u8()? & 0x80 != 0 {
            let status = reader.read_u8()?;
            // Only channel statuses become running status; meta and sysex
            // events leave the previous one in force
            if status < status::SYSEX {
                state.running_status = Some(status);
            }
            status
        } else {
            state
                .running_status
                .ok_or(Error::MissingRunningStatus {
                    offset: reader.position(),
                })?
        };

        let message = match status {
            status::META => {
                let meta_type = reader.read_u8()?;
                let len = reader.read_var_len()? as usize;
                let data = reader.slice(len)?;
                Message::from_meta(meta_type, data)
            }
            status::SYSEX | status::SYSEX_ESCAPE => {
                let len = reader.read_var_len()? as usize;
                reader.skip(len)?;
                Message::SysEx { len }
            }
            s if s >= status::SYSEX => {
                reader.skip(events::system_data_size(s))?;
                Message::System { status: s }
            }
            s => {
                let data = reader.slice(events::channel_data_size(s))?;
                Message::from_channel(&RawEvent {
                    delta,
                    status: s,
                    channel: s & 0x0F,
                    data,
                })
                .unwrap_or(Message::System { status: s })
            }
        };

        Ok(TrackEvent { delta, message })
    }
}

/// Decode a complete MIDI file
pub fn parse(data: &[u8]) -> Result<Smf> {
    let mut parser = SmfParser::new(data);
    let header = parser.parse_header()?;
    let tracks = parser.parse_tracks(&header)?;
    Ok(Smf { header, tracks })
}
