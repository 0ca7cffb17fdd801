//! Shell script backend for the Linux `beep` utility
//!
//! The speaker plays one frequency at a time, so chords are arpeggiated in
//! short pulses. Parameters accumulate across the file and are split into
//! `beep` invocations that stay under the shell's argument length limit.

use super::Backend;

/// Reference pitch for A4
pub const A4_HZ: f64 = 440.0;

/// Arpeggio pulse bounds in milliseconds
const MIN_PULSE_MS: f64 = 10.0;
const MAX_PULSE_MS: f64 = 20.0;

/// Longest argument list to pass to a single `beep` (real limit is a bit more)
pub const COMMAND_LINE_LEN: usize = 80_000;

const NOTE_FLAG: &str = " -n";

/// Frequency of a (possibly fractional) MIDI note
pub fn to_freq(note: f64) -> f64 {
    (A4_HZ / 32.0) * 2f64.powf((note - 9.0) / 12.0)
}

/// `beep` arguments for a set of frequencies sounding for `ms` milliseconds
pub fn chord_params(freqs: &[f64], ms: f64) -> String {
    match freqs {
        _ if ms <= 0.0 => String::new(),
        [] => format!(" -D {}", ms as u64),
        [f] => format!(" -n -f {} -l {}", *f as u64, ms as u64),
        _ => {
            let n = freqs.len() as f64;
            let pulse = (ms / n).clamp(MIN_PULSE_MS, MAX_PULSE_MS);
            // At least one pass: better a slight slow-down than a lost chord
            let repeats = ((ms / pulse / n) as usize).max(1);
            let pass = freqs
                .iter()
                .map(|&f| chord_params(&[f], pulse))
                .collect::<Vec<_>>()
                .join(" -D 0");
            pass.repeat(repeats)
        }
    }
}

/// Beep script backend
pub struct Beep {
    params: Vec<String>,
}

impl Beep {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Split the accumulated parameters into `beep` command lines
    pub fn command_lines(&self) -> Vec<String> {
        let mut params = self.params.join(" ");
        let mut lines = Vec::new();
        while let Some(at) = params.find(NOTE_FLAG) {
            // The first note needs no -n, and leading silence is dropped
            params.drain(..at + NOTE_FLAG.len());
            let brk = params
                .get(COMMAND_LINE_LEN..)
                .and_then(|tail| tail.find(NOTE_FLAG))
                .map(|i| i + COMMAND_LINE_LEN);
            let rest = match brk {
                Some(brk) => params.split_off(brk),
                None => String::new(),
            };
            lines.push(format!("beep{}", params));
            params = rest;
        }
        lines
    }
}

impl Default for Beep {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Beep {
    fn name(&self) -> &'static str {
        "beep"
    }

    fn extension(&self) -> &'static str {
        ".sh"
    }

    fn init(&mut self) {
        self.params.clear();
    }

    fn render_chord(&mut self, pitches: &[f64], duration: u64) {
        let ms = duration as f64 / 1000.0;
        // Some beep versions add a default delay between notes unless told not to
        let needs_delay = match self.params.last() {
            Some(last) => {
                let words: Vec<&str> = last.split_whitespace().collect();
                !words[words.len().saturating_sub(2)..].contains(&"-D")
            }
            None => false,
        };
        if !pitches.is_empty() && needs_delay {
            self.params.push("-D 0".to_string());
        }
        let freqs: Vec<f64> = pitches.iter().map(|&p| to_freq(p)).collect();
        self.params.push(chord_params(&freqs, ms));
    }

    fn finalize(&mut self) -> Vec<u8> {
        let mut out = String::from("#!/bin/sh\n");
        for line in self.command_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(b: &mut Beep) -> String {
        String::from_utf8(b.finalize()).unwrap()
    }

    #[test]
    fn test_to_freq() {
        assert!((to_freq(69.0) - 440.0).abs() < 1e-9);
        assert!((to_freq(57.0) - 220.0).abs() < 1e-9);
        assert!((to_freq(69.5) - 452.893).abs() < 1e-3);
    }

    #[test]
    fn test_chord_params() {
        assert_eq!(chord_params(&[440.0], 0.0), "");
        assert_eq!(chord_params(&[], 250.0), " -D 250");
        assert_eq!(chord_params(&[440.0], 500.5), " -n -f 440 -l 500");
        assert_eq!(
            chord_params(&[440.0, 550.0], 80.0),
            " -n -f 440 -l 20 -D 0 -n -f 550 -l 20".repeat(2)
        );
    }

    #[test]
    fn test_short_chord_plays_once() {
        assert_eq!(chord_params(&[440.0, 550.0, 660.0], 12.0).matches("-n").count(), 3);
    }

    #[test]
    fn test_single_note_script() {
        let mut b = Beep::new();
        b.init();
        b.render_chord(&[69.0], 500_000);
        assert_eq!(script(&mut b), "#!/bin/sh\nbeep -f 440 -l 500\n");
    }

    #[test]
    fn test_delay_between_notes() {
        let mut b = Beep::new();
        b.render_chord(&[69.0], 100_000);
        b.render_chord(&[], 50_000);
        b.render_chord(&[57.0], 100_000);
        b.render_chord(&[69.0], 100_000);
        assert_eq!(
            script(&mut b),
            "#!/bin/sh\nbeep -f 440 -l 100  -D 50  -n -f 220 -l 100 -D 0  -n -f 440 -l 100\n"
        );
    }

    #[test]
    fn test_leading_silence_dropped() {
        let mut b = Beep::new();
        b.render_chord(&[], 1_000_000);
        assert_eq!(script(&mut b), "#!/bin/sh\n");
        b.render_chord(&[69.0], 100_000);
        assert_eq!(script(&mut b), "#!/bin/sh\nbeep -f 440 -l 100\n");
    }

    #[test]
    fn test_long_scripts_split() {
        let mut b = Beep::new();
        for _ in 0..10_000 {
            b.render_chord(&[69.0], 100_000);
        }
        let lines = b.command_lines();
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.starts_with("beep -f 440"));
            assert!(line.len() < COMMAND_LINE_LEN + 100);
        }
    }
}
