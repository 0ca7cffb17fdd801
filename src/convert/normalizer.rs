//! Track walking: turns decoded events into timed pitch sets

use super::channel::Channels;
use super::chord::{sort_pitches, TimedChord};
use super::tempo::TempoMap;
use crate::smf::{Format, Header, Message, TrackEvent};
use std::collections::VecDeque;

/// Walks tracks, emitting the sounding pitch set at every time advance
pub struct Normalizer {
    channels: Channels,
    tempo: TempoMap,
    max_time: Option<u64>,
    /// Buffer tracks and merge them instead of playing them in sequence
    interleave: bool,
    queues: Vec<VecDeque<TimedChord>>,
}

impl Normalizer {
    pub fn new(header: &Header, max_time: Option<u64>) -> Self {
        Self {
            channels: Channels::new(),
            tempo: TempoMap::new(header.timing),
            max_time,
            interleave: header.format == Format::MultiTrack,
            queues: Vec::new(),
        }
    }

    /// Process every track, passing chords to `emit` in playing order
    pub fn run<F: FnMut(TimedChord)>(mut self, tracks: &[Vec<TrackEvent>], mut emit: F) {
        // Sequential tracks continue the timeline, so tempo lookups use
        // ticks counted from the start of the first track
        let mut end_tick = 0;
        for (index, events) in tracks.iter().enumerate() {
            tracing::debug!(track = index, "normalizing track");
            self.channels.release_all();
            if self.interleave {
                let mut queue = VecDeque::new();
                self.run_track(events, 0, |chord| queue.push_back(chord));
                self.queues.push(queue);
            } else {
                end_tick = self.run_track(events, end_tick, &mut emit);
            }
        }
        if self.interleave {
            merge_wavefront(std::mem::take(&mut self.queues), emit);
        }
    }

    fn clamp(&self, micros: u64) -> u64 {
        match self.max_time {
            Some(max) => micros.min(max),
            None => micros,
        }
    }

    /// Walk one track starting at absolute `start_tick`; returns the tick it ends on
    fn run_track<F: FnMut(TimedChord)>(
        &mut self,
        events: &[TrackEvent],
        start_tick: u64,
        mut emit: F,
    ) -> u64 {
        let mut tick = start_tick;
        for event in events {
            if event.delta > 0 {
                let from = self.clamp(self.tempo.micros_at(tick));
                tick += event.delta as u64;
                let to = self.clamp(self.tempo.micros_at(tick));
                if to > from {
                    emit(TimedChord::new(self.channels.sounding(), to - from));
                }
            }
            self.dispatch(tick, &event.message);
        }
        tick
    }

    fn dispatch(&mut self, tick: u64, message: &Message) {
        match *message {
            Message::NoteOn { channel, key, .. } => self.channels.note_on(channel, key),
            Message::NoteOff { channel, key } => self.channels.note_off(channel, key),
            Message::Controller {
                channel,
                controller,
                value,
            } => self.channels.get_mut(channel).controller(controller, value),
            Message::PitchBend { channel, msb, .. } => {
                self.channels.get_mut(channel).pitch_bend(msb)
            }
            Message::Tempo { micros_per_quarter } => {
                self.tempo.set_tempo(tick, micros_per_quarter)
            }
            _ => {}
        }
    }
}

/// Merge per-track chord queues into one time-ordered stream.
///
/// Each step takes the shortest pending head, sounds the union of all heads
/// for that long, and shortens or consumes the heads.
pub fn merge_wavefront<F: FnMut(TimedChord)>(mut queues: Vec<VecDeque<TimedChord>>, mut emit: F) {
    queues.retain(|q| !q.is_empty());
    while let Some(step) = queues.iter().filter_map(|q| q.front()).map(|c| c.duration).min() {
        let mut pitches: Vec<f64> = queues
            .iter()
            .filter_map(|q| q.front())
            .flat_map(|c| c.pitches.iter().copied())
            .collect();
        sort_pitches(&mut pitches);
        emit(TimedChord::new(pitches, step));

        for queue in &mut queues {
            if let Some(head) = queue.front_mut() {
                head.duration -= step;
                if head.duration == 0 {
                    queue.pop_front();
                }
            }
        }
        queues.retain(|q| !q.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smf::Timing;

    fn header(format: Format) -> Header {
        Header {
            format,
            track_count: 1,
            timing: Timing::Metrical(100),
        }
    }

    fn ev(delta: u32, message: Message) -> TrackEvent {
        TrackEvent { delta, message }
    }

    fn on(key: u8) -> Message {
        Message::NoteOn {
            channel: 0,
            key,
            velocity: 64,
        }
    }

    fn off(key: u8) -> Message {
        Message::NoteOff { channel: 0, key }
    }

    fn tempo(micros_per_quarter: u32) -> Message {
        Message::Tempo { micros_per_quarter }
    }

    fn collect(header: &Header, tracks: &[Vec<TrackEvent>], max: Option<u64>) -> Vec<TimedChord> {
        let mut out = Vec::new();
        Normalizer::new(header, max).run(tracks, |c| out.push(c));
        out
    }

    #[test]
    fn test_single_note() {
        let tracks = vec![vec![ev(0, tempo(500_000)), ev(0, on(60)), ev(100, off(60))]];
        let out = collect(&header(Format::SingleTrack), &tracks, None);
        assert_eq!(out, vec![TimedChord::new(vec![60.0], 500_000)]);
    }

    #[test]
    fn test_default_tempo_before_tempo_event() {
        let tracks = vec![vec![ev(0, on(60)), ev(3, off(60))]];
        let out = collect(&header(Format::SingleTrack), &tracks, None);
        assert_eq!(out, vec![TimedChord::new(vec![60.0], 30_000)]);
    }

    #[test]
    fn test_chord_per_advance() {
        let tracks = vec![vec![
            ev(0, tempo(100_000)),
            ev(0, on(60)),
            ev(10, on(64)),
            ev(10, off(60)),
            ev(10, off(64)),
            ev(10, Message::EndOfTrack),
        ]];
        let out = collect(&header(Format::SingleTrack), &tracks, None);
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![60.0], 10_000),
                TimedChord::new(vec![60.0, 64.0], 10_000),
                TimedChord::new(vec![64.0], 10_000),
                TimedChord::new(vec![], 10_000),
            ]
        );
    }

    #[test]
    fn test_max_time_clamps() {
        let tracks = vec![vec![ev(0, tempo(100_000)), ev(0, on(60)), ev(100, off(60))]];
        let out = collect(&header(Format::SingleTrack), &tracks, Some(25_000));
        assert_eq!(out, vec![TimedChord::new(vec![60.0], 25_000)]);
    }

    #[test]
    fn test_sequential_tracks() {
        let tracks = vec![
            vec![ev(0, tempo(100_000)), ev(0, on(60)), ev(10, off(60))],
            vec![ev(0, on(62)), ev(20, off(62))],
        ];
        let out = collect(&header(Format::Sequential), &tracks, None);
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![60.0], 10_000),
                TimedChord::new(vec![62.0], 20_000),
            ]
        );
    }

    #[test]
    fn test_sequential_tracks_keep_tempo() {
        let tracks = vec![
            vec![
                ev(0, tempo(100_000)),
                ev(0, on(60)),
                ev(100, off(60)),
                ev(0, tempo(200_000)),
            ],
            vec![ev(0, on(62)), ev(100, off(62))],
        ];
        let out = collect(&header(Format::Sequential), &tracks, None);
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![60.0], 100_000),
                TimedChord::new(vec![62.0], 200_000),
            ]
        );
    }

    #[test]
    fn test_sequential_tempo_change_carries_into_next_track() {
        // Track 1 starts at tick 100, after the change to 300000 at tick 50
        let tracks = vec![
            vec![ev(0, tempo(100_000)), ev(0, on(60)), ev(50, tempo(300_000)), ev(50, off(60))],
            vec![ev(0, on(62)), ev(10, off(62))],
        ];
        let out = collect(&header(Format::Sequential), &tracks, None);
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![60.0], 50_000),
                TimedChord::new(vec![60.0], 150_000),
                TimedChord::new(vec![62.0], 30_000),
            ]
        );
    }

    #[test]
    fn test_held_notes_released_at_track_start() {
        let tracks = vec![
            vec![ev(0, tempo(100_000)), ev(0, on(60)), ev(10, Message::EndOfTrack)],
            vec![ev(0, on(62)), ev(10, off(62))],
        ];
        let out = collect(&header(Format::Sequential), &tracks, None);
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![60.0], 10_000),
                TimedChord::new(vec![62.0], 10_000),
            ]
        );
    }

    #[test]
    fn test_multitrack_uses_conductor_tempo() {
        let tracks = vec![
            vec![ev(0, tempo(100_000)), ev(20, tempo(200_000)), ev(20, Message::EndOfTrack)],
            vec![ev(0, on(60)), ev(40, off(60))],
            vec![ev(10, on(67)), ev(20, off(67))],
        ];
        let out = collect(&header(Format::MultiTrack), &tracks, None);
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![60.0], 10_000),
                TimedChord::new(vec![60.0, 67.0], 10_000),
                TimedChord::new(vec![60.0, 67.0], 20_000),
                TimedChord::new(vec![60.0], 20_000),
            ]
        );
    }

    #[test]
    fn test_wavefront_merge() {
        let queues = vec![
            VecDeque::from(vec![
                TimedChord::new(vec![60.0], 30),
                TimedChord::new(vec![62.0], 10),
            ]),
            VecDeque::new(),
            VecDeque::from(vec![TimedChord::new(vec![48.0, 60.0], 20)]),
        ];
        let mut out = Vec::new();
        merge_wavefront(queues, |c| out.push(c));
        assert_eq!(
            out,
            vec![
                TimedChord::new(vec![48.0, 60.0], 20),
                TimedChord::new(vec![60.0], 10),
                TimedChord::new(vec![62.0], 10),
            ]
        );
        let total: u64 = out.iter().map(|c| c.duration).sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn test_bend_displaces_pitch() {
        let tracks = vec![vec![
            ev(0, tempo(100_000)),
            ev(0, Message::PitchBend {
                channel: 0,
                lsb: 0x7F,
                msb: 96,
            }),
            ev(0, on(60)),
            ev(10, off(60)),
        ]];
        let out = collect(&header(Format::SingleTrack), &tracks, None);
        assert_eq!(out, vec![TimedChord::new(vec![60.5], 10_000)]);
    }
}
