//! RISC OS Maestro music file writer
//!
//! Notes are held as they sound, closed when a chord no longer contains
//! them, then quantized to hemidemisemiquavers and laid out on up to eight
//! staves. The file is written at Maestro's fastest tempo for accuracy.

use super::Backend;
use crate::convert::chord::note_numbers;

/// File magic and format version
pub const HEADER: &[u8] = b"Maestro\n\x02";

/// Tempos Maestro can store, indexed by the BPM block
pub const ALLOWED_BPMS: [u32; 15] = [40, 50, 60, 65, 70, 80, 90, 100, 115, 130, 145, 160, 175, 190, 210];

/// Tempo used for every file
pub const BPM: u32 = 210;

/// One hemidemisemiquaver (1/64 note) at `BPM`, in microseconds
pub const HEMI_MICROS: u64 = 3_750_000 / BPM as u64;

/// Hemis per 4/4 bar
const BAR_HEMIS: u32 = 64;

/// Gate-byte time units per bar (a whole note plays for 512)
const BAR_GATE_UNITS: u32 = 512;

/// Stave fill order, so 2-, 3- and 4-stave views split parts sensibly
const STAVE_ORDER: [usize; 8] = [0, 4, 6, 2, 1, 3, 5, 7];

const STAVE_COUNT: usize = 8;

/// Middle line of the treble stave
const TREBLE_MIDDLE: i32 = 71;

/// Block type bytes
mod block {
    pub const MUSIC: u8 = 1;
    pub const STAVES: u8 = 2;
    pub const INSTRUMENTS: u8 = 3;
    pub const VOLUMES: u8 = 4;
    pub const TEMPO: u8 = 6;
}

#[derive(Debug, Clone, PartialEq)]
struct Note {
    key: i32,
    start: u64,
    end: u64,
}

impl Note {
    /// Snap both ends to the hemi grid, keeping at least one hemi
    fn quantize(&mut self) {
        self.start = self.start / HEMI_MICROS * HEMI_MICROS;
        self.end = self.end / HEMI_MICROS * HEMI_MICROS;
        if self.end == self.start {
            self.end += HEMI_MICROS;
        }
    }
}

/// Maestro backend
pub struct Maestro {
    time: u64,
    sounding: Vec<Note>,
    staves: [Vec<Note>; STAVE_COUNT],
}

impl Maestro {
    pub fn new() -> Self {
        Self {
            time: 0,
            sounding: Vec::new(),
            staves: Default::default(),
        }
    }

    fn place(&mut self, note: Note) {
        for &i in &STAVE_ORDER {
            let stave = &mut self.staves[i];
            if stave.last().map_or(true, |last| last.end <= note.start) {
                stave.push(note);
                return;
            }
        }
        tracing::warn!(key = note.key, start = note.start, "Insufficient channels: dropping note");
    }

    /// Note/rest byte pairs for one stave
    fn stave_queue(notes: &[Note]) -> Vec<u8> {
        let mut queue = Vec::new();
        let mut from = 0;
        let mut bar_left = BAR_HEMIS;
        for note in notes {
            let rest = ((note.start - from) / HEMI_MICROS) as u32;
            for (length, dots) in split_hemis(rest, &mut bar_left) {
                queue.extend_from_slice(&note_code(None, length, dots, false));
            }
            let parts = split_hemis(((note.end - note.start) / HEMI_MICROS) as u32, &mut bar_left);
            for (i, &(length, dots)) in parts.iter().enumerate() {
                let tie = i + 1 < parts.len();
                queue.extend_from_slice(&note_code(Some(note.key), length, dots, tie));
            }
            from = note.end;
        }
        queue
    }
}

impl Default for Maestro {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a run of hemis into (length, dots) note values that do not cross
/// barlines. `length` is 1 for a whole note, 2 for a half and so on.
pub fn split_hemis(mut hemis: u32, bar_left: &mut u32) -> Vec<(u32, u32)> {
    let mut parts = Vec::new();
    let mut length = 1;
    let mut value = BAR_HEMIS;
    while hemis > 0 && value > 0 {
        while hemis >= value && value <= *bar_left {
            let mut taken = value;
            let mut dots = 0;
            let mut dot_value = value / 2;
            while dot_value > 0 && dots < 3 && taken + dot_value <= hemis && taken + dot_value <= *bar_left {
                dots += 1;
                taken += dot_value;
                dot_value /= 2;
            }
            hemis -= taken;
            *bar_left -= taken;
            parts.push((length, dots));
            if *bar_left == 0 {
                *bar_left = BAR_HEMIS;
                length = 1;
                value = BAR_HEMIS;
            }
        }
        length <<= 1;
        value >>= 1;
    }
    parts
}

/// Diatonic step of a MIDI note (C = 0, D = 1, ... per octave of 7)
fn diatonic_step(key: i32) -> i32 {
    let mut m = key.rem_euclid(12);
    if m >= 5 {
        m += 1;
    }
    m / 2 + 7 * key.div_euclid(12)
}

/// Encode a note (or rest when `key` is None) as Maestro's two bytes
pub fn note_code(key: Option<i32>, length: u32, dots: u32, tie: bool) -> [u8; 2] {
    let (first, sharp) = match key {
        Some(key) => {
            let mut r = diatonic_step(TREBLE_MIDDLE) - diatonic_step(key);
            let stem_down = r > 0;
            r = 16 - r;
            while r < 1 {
                r += 7;
            }
            while r > 31 {
                r -= 7;
            }
            let mut first = r * 8;
            if tie {
                first += 4;
            }
            if stem_down {
                first += 1;
            }
            (first as u8, diatonic_step(key) == diatonic_step(key - 1))
        }
        None => (0, false),
    };

    let mut shift = 0u8;
    let mut l = length;
    while l > 0 {
        l /= 2;
        shift += 1;
    }
    let accidental = if sharp { 2 } else { 1 };
    [first, shift * 32 + dots as u8 * 8 + accidental]
}

/// Play length of a note from its second byte, in gate units
pub fn play_len(second: u8) -> u32 {
    let mut l = 8;
    for _ in (second >> 5)..7 {
        l *= 2;
    }
    let mut dot_value = l / 2;
    for _ in 0..((second >> 3) & 3) {
        l += dot_value;
        dot_value /= 2;
    }
    l
}

/// Gate bytes: which staves start a new note at each step, plus barlines
fn gate_bytes(queues: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = vec![0usize; queues.len()];
    let mut len_left = vec![0u32; queues.len()];
    let mut bar_left = BAR_GATE_UNITS;

    while queues.iter().zip(&pos).any(|(q, &p)| p < q.len()) {
        let mut gates = 0u8;
        let mut to_sub = 0;
        for i in 0..queues.len() {
            if pos[i] < queues[i].len() && len_left[i] == 0 {
                gates |= 1 << i;
                len_left[i] = play_len(queues[i][pos[i] + 1]);
                pos[i] += 2;
            }
            if len_left[i] > 0 && (to_sub == 0 || len_left[i] < to_sub) {
                to_sub = len_left[i];
            }
        }
        if gates != 0 {
            out.push(gates);
        }
        for left in len_left.iter_mut().filter(|l| **l > 0) {
            *left -= to_sub;
        }
        bar_left = bar_left.saturating_sub(to_sub);
        if bar_left == 0 {
            out.extend_from_slice(&[0, 32]);
            bar_left = BAR_GATE_UNITS;
        }
    }
    out
}

fn basic_int(out: &mut Vec<u8>, n: u32) {
    out.push(0x40);
    out.extend_from_slice(&n.to_be_bytes());
}

impl Backend for Maestro {
    fn name(&self) -> &'static str {
        "maestro"
    }

    fn extension(&self) -> &'static str {
        ",af1"
    }

    fn is_text(&self) -> bool {
        false
    }

    fn init(&mut self) {
        *self = Self::new();
    }

    fn render_chord(&mut self, pitches: &[f64], duration: u64) {
        let mut keys: Vec<i32> = note_numbers(pitches);
        keys.reverse();

        for mut note in std::mem::take(&mut self.sounding) {
            if let Some(i) = keys.iter().position(|&k| k == note.key) {
                keys.remove(i);
                self.sounding.push(note);
            } else {
                note.end = self.time;
                note.quantize();
                self.place(note);
            }
        }
        for key in keys {
            self.sounding.push(Note {
                key,
                start: self.time,
                end: self.time,
            });
        }
        self.time += duration;
    }

    fn finalize(&mut self) -> Vec<u8> {
        self.render_chord(&[], 0);

        let queues: Vec<Vec<u8>> = self.staves.iter().map(|s| Self::stave_queue(s)).collect();
        let gates = gate_bytes(&queues);
        let staves = queues.iter().filter(|q| !q.is_empty()).count().clamp(1, 4);

        let mut out = HEADER.to_vec();
        let bpm_index = ALLOWED_BPMS.iter().position(|&b| b == BPM).unwrap_or(ALLOWED_BPMS.len() - 1);
        out.extend_from_slice(&[block::TEMPO, bpm_index as u8]);
        out.push(block::VOLUMES);
        out.extend_from_slice(&[7; STAVE_COUNT]);

        out.push(block::MUSIC);
        basic_int(&mut out, gates.len() as u32);
        for q in &queues {
            basic_int(&mut out, q.len() as u32);
        }
        out.extend_from_slice(&gates);
        for q in &queues {
            out.extend_from_slice(q);
        }

        // Staves minus one, percussion staves minus one
        out.extend_from_slice(&[block::STAVES, staves as u8 - 1, 0]);
        out.push(block::INSTRUMENTS);
        for i in 0..STAVE_COUNT as u8 {
            out.extend_from_slice(&[i, 1]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn music_block_offset() -> usize {
        HEADER.len() + 2 + 1 + STAVE_COUNT
    }

    #[test]
    fn test_hemi_length() {
        assert_eq!(HEMI_MICROS, 17857);
    }

    #[test]
    fn test_split_whole_bar() {
        let mut bar_left = BAR_HEMIS;
        assert_eq!(split_hemis(64, &mut bar_left), vec![(1, 0)]);
        assert_eq!(bar_left, BAR_HEMIS);
    }

    #[test]
    fn test_split_dotted() {
        let mut bar_left = BAR_HEMIS;
        // Dotted half note: 32 + 16
        assert_eq!(split_hemis(48, &mut bar_left), vec![(2, 1)]);
        assert_eq!(bar_left, 16);
        // Crosses the barline: quarter fills the bar, then a half
        assert_eq!(split_hemis(48, &mut bar_left), vec![(4, 0), (2, 0)]);
        assert_eq!(bar_left, 32);
    }

    #[test]
    fn test_note_code() {
        // Middle C sits six steps below the middle line
        assert_eq!(note_code(Some(60), 4, 0, false), [81, 3 * 32 + 1]);
        assert_eq!(note_code(Some(61), 4, 0, false), [81, 3 * 32 + 2]);
        assert_eq!(note_code(Some(71), 1, 0, true), [16 * 8 + 4, 32 + 1]);
        assert_eq!(note_code(None, 2, 1, false), [0, 2 * 32 + 8 + 1]);
    }

    #[test]
    fn test_play_len() {
        assert_eq!(play_len(32 + 1), 512);
        assert_eq!(play_len(3 * 32 + 1), 128);
        assert_eq!(play_len(2 * 32 + 8 + 1), 384);
        assert_eq!(play_len(7 * 32 + 3 * 8 + 1), 15);
    }

    #[test]
    fn test_long_note_ties_across_bar() {
        let mut m = Maestro::new();
        m.init();
        m.render_chord(&[60.0], 128 * HEMI_MICROS);
        let out = m.finalize();

        assert!(out.starts_with(HEADER));
        let at = music_block_offset();
        assert_eq!(&out[HEADER.len()..at], &[6, 14, 4, 7, 7, 7, 7, 7, 7, 7, 7]);
        assert_eq!(out[at], 1);
        // Gate bytes length, then stave 0 with four bytes
        assert_eq!(&out[at + 1..at + 6], &[0x40, 0, 0, 0, 6]);
        assert_eq!(&out[at + 6..at + 11], &[0x40, 0, 0, 0, 4]);
        let data = at + 1 + 9 * 5;
        assert_eq!(&out[data..data + 6], &[1, 0, 32, 1, 0, 32]);
        assert_eq!(&out[data + 6..data + 10], &[85, 33, 81, 33]);
        assert_eq!(&out[data + 10..data + 13], &[2, 0, 0]);
        assert_eq!(out[data + 13], 3);
        assert_eq!(out.len(), data + 14 + 16);
    }

    /// Gate bytes and per-stave queues from a finished file
    fn music_block(out: &[u8]) -> (Vec<u8>, Vec<Vec<u8>>) {
        let at = music_block_offset();
        assert_eq!(out[at], 1);
        let lens: Vec<usize> = (0..=STAVE_COUNT)
            .map(|i| {
                let p = at + 1 + i * 5;
                assert_eq!(out[p], 0x40);
                u32::from_be_bytes([out[p + 1], out[p + 2], out[p + 3], out[p + 4]]) as usize
            })
            .collect();
        let mut p = at + 1 + (STAVE_COUNT + 1) * 5;
        let gates = out[p..p + lens[0]].to_vec();
        p += lens[0];
        let mut queues = Vec::new();
        for &len in &lens[1..] {
            queues.push(out[p..p + len].to_vec());
            p += len;
        }
        assert_eq!(out[p], 2);
        (gates, queues)
    }

    #[test]
    fn test_leading_rest_and_barline() {
        let mut m = Maestro::new();
        m.render_chord(&[], 48 * HEMI_MICROS);
        m.render_chord(&[60.0], 32 * HEMI_MICROS);
        let out = m.finalize();
        let (gates, queues) = music_block(&out);

        // Dotted half rest, then a quarter tied over the barline to a quarter
        assert_eq!(queues[0], vec![0, 73, 85, 97, 81, 97]);
        assert!(queues[1..].iter().all(|q| q.is_empty()));
        assert_eq!(gates, vec![1, 1, 0, 32, 1]);
    }

    #[test]
    fn test_overlapping_notes_use_two_staves() {
        let mut m = Maestro::new();
        m.render_chord(&[60.0, 64.0], 16 * HEMI_MICROS);
        m.render_chord(&[64.0], 48 * HEMI_MICROS);
        m.render_chord(&[62.0], 64 * HEMI_MICROS);
        let out = m.finalize();
        let (gates, queues) = music_block(&out);

        assert_eq!(queues[0], vec![81, 97, 0, 73, 89, 33]);
        assert_eq!(queues[4], vec![97, 33]);
        // Staves 0 and 4 start together, then stave 0 alone
        assert_eq!(gates, vec![0b10001, 1, 0, 32, 1, 0, 32]);
        let staves = out.len() - 17 - 3;
        assert_eq!(&out[staves..staves + 3], &[2, 1, 0]);
    }

    #[test]
    fn test_held_note_extends() {
        let mut m = Maestro::new();
        m.render_chord(&[60.0], 32 * HEMI_MICROS);
        m.render_chord(&[60.0, 64.0], 32 * HEMI_MICROS);
        m.render_chord(&[], 0);
        assert_eq!(m.staves[0], vec![Note { key: 60, start: 0, end: 64 * HEMI_MICROS }]);
        assert_eq!(m.staves[4].len(), 1);
        assert_eq!(m.staves[4][0].start, 32 * HEMI_MICROS);
    }

    #[test]
    fn test_short_note_keeps_one_hemi() {
        let mut m = Maestro::new();
        m.render_chord(&[60.0], 100);
        m.render_chord(&[], 0);
        assert_eq!(m.staves[0][0].end - m.staves[0][0].start, HEMI_MICROS);
    }

    #[test]
    fn test_too_many_voices_drops_notes() {
        let mut m = Maestro::new();
        let pitches: Vec<f64> = (60..70).map(|n| n as f64).collect();
        m.render_chord(&pitches, 16 * HEMI_MICROS);
        m.render_chord(&[], 0);
        let placed: usize = m.staves.iter().map(|s| s.len()).sum();
        assert_eq!(placed, STAVE_COUNT);
    }

    #[test]
    fn test_empty_output_has_one_stave() {
        let mut m = Maestro::new();
        let out = m.finalize();
        let tail = &out[out.len() - 17 - 3..out.len() - 17];
        assert_eq!(tail, &[2, 0, 0]);
    }
}
