//! MIDI conversion pipeline
//!
//! Decoder -> normalizer -> dedup engine -> backend, one file at a time.

pub mod channel;
pub mod chord;
pub mod dedup;
pub mod normalizer;
pub mod tempo;

use crate::backends::{self, Backend, BackendOptions};
use crate::error::Result;
use crate::smf::{self, Smf};
use chord::Chord;
use dedup::DedupEngine;
use normalizer::Normalizer;
use std::path::Path;

/// Options fixed for a whole run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Backend name (see `backends::list_backends`)
    pub backend: String,
    pub backend_options: BackendOptions,
    /// Keep only the highest pitch of each chord
    pub monophonic: bool,
    /// Stop after this many microseconds
    pub max_time_us: Option<u64>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            backend: "beep".to_string(),
            backend_options: BackendOptions::default(),
            monophonic: false,
            max_time_us: None,
        }
    }
}

/// Converts MIDI files with one backend selected up front
pub struct Converter {
    backend: Box<dyn Backend>,
    monophonic: bool,
    max_time_us: Option<u64>,
}

impl Converter {
    pub fn new(options: &ConvertOptions) -> Result<Self> {
        let backend = backends::create_backend(&options.backend, &options.backend_options)?;
        Ok(Self::with_backend(backend, options))
    }

    /// Use an already constructed backend
    pub fn with_backend(backend: Box<dyn Backend>, options: &ConvertOptions) -> Self {
        Self {
            backend,
            monophonic: options.monophonic,
            max_time_us: options.max_time_us,
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Convert an in-memory MIDI file.
    ///
    /// The file is decoded completely before the backend sees anything, so a
    /// decode error leaves no partial output and no stale backend state.
    pub fn convert(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let smf = smf::parse(data)?;

        let backend = &mut self.backend;
        backend.init();
        let mut engine = DedupEngine::new(backend.quantization_grid(), self.monophonic);
        let mut count = 0usize;
        Normalizer::new(&smf.header, self.max_time_us).run(&smf.tracks, |raw| {
            if let Some(chord) = engine.push(raw) {
                backend.render_chord(&chord.pitches, chord.duration);
                count += 1;
            }
        });
        if let Some(chord) = engine.flush() {
            backend.render_chord(&chord.pitches, chord.duration);
            count += 1;
        }
        tracing::debug!(chords = count, backend = backend.name(), "rendered chords");

        Ok(backend.finalize())
    }

    /// Convert a MIDI file on disk
    pub fn convert_file(&mut self, path: &Path) -> Result<Vec<u8>> {
        tracing::info!("Parsing MIDI file {}", path.display());
        let data = std::fs::read(path)?;
        self.convert(&data)
    }
}

/// Run a decoded file through the normalizer and dedup engine only
pub fn chords(smf: &Smf, grid: Option<u64>, monophonic: bool, max_time_us: Option<u64>) -> Vec<Chord> {
    let mut engine = DedupEngine::new(grid, monophonic);
    let mut out = Vec::new();
    Normalizer::new(&smf.header, max_time_us).run(&smf.tracks, |raw| {
        out.extend(engine.push(raw));
    });
    out.extend(engine.flush());
    out
}
