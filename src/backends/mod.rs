//! Output backends

pub mod bbc;
pub mod beep;
pub mod maestro;

pub use bbc::BbcOutput;

use crate::error::{Error, Result};

/// Backend configuration options
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// BBC backends: listing, SDL listing, typed binary or disk image data
    pub bbc_output: BbcOutput,
}

/// Output backend trait.
///
/// The pipeline calls `init` once per file, `render_chord` for every
/// deduplicated chord in order, then `finalize` to collect the output.
pub trait Backend {
    /// Get backend name (e.g., "bbc")
    fn name(&self) -> &'static str;

    /// File name suffix for the output, including any separator
    fn extension(&self) -> &'static str;

    /// Whether the output is printable text
    fn is_text(&self) -> bool {
        true
    }

    /// Smallest duration the target can represent, in microseconds
    fn quantization_grid(&self) -> Option<u64> {
        None
    }

    /// Reset per-file state
    fn init(&mut self);

    /// Consume one chord: ascending pitches (MIDI note numbers, possibly
    /// fractional) sounding for `duration` microseconds
    fn render_chord(&mut self, pitches: &[f64], duration: u64);

    /// Serialize everything rendered since `init`
    fn finalize(&mut self) -> Vec<u8>;
}

/// Create a backend by name
pub fn create_backend(name: &str, options: &BackendOptions) -> Result<Box<dyn Backend>> {
    let bbc_only = options.bbc_output != BbcOutput::Listing;
    let backend: Box<dyn Backend> = match name {
        "bbc" => Box::new(bbc::Multiplexer::new(bbc::Machine::BbcMicro, options.bbc_output)?),
        "electron" => Box::new(bbc::Multiplexer::new(bbc::Machine::Electron, options.bbc_output)?),
        "beep" | "maestro" if bbc_only => {
            return Err(Error::InvalidOption(format!(
                "{:?} output needs the bbc or electron backend",
                options.bbc_output
            )))
        }
        "beep" => Box::new(beep::Beep::new()),
        "maestro" => Box::new(maestro::Maestro::new()),
        _ => return Err(Error::UnknownBackend(name.to_string())),
    };
    Ok(backend)
}

/// List all available backend names
pub fn list_backends() -> Vec<&'static str> {
    vec!["beep", "bbc", "electron", "maestro"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_backend_exists() {
        for name in list_backends() {
            let backend = create_backend(name, &BackendOptions::default()).unwrap();
            assert_eq!(backend.name(), name);
        }
    }

    #[test]
    fn test_bbc_output_needs_bbc_backend() {
        let options = BackendOptions {
            bbc_output: BbcOutput::Sdl,
        };
        assert!(matches!(create_backend("beep", &options), Err(Error::InvalidOption(_))));
        assert!(create_backend("electron", &options).is_ok());

        let options = BackendOptions {
            bbc_output: BbcOutput::Ssd,
        };
        assert!(matches!(create_backend("electron", &options), Err(Error::InvalidOption(_))));
        assert!(!create_backend("bbc", &options).unwrap().is_text());
    }

    #[test]
    fn test_unknown_backend() {
        assert!(matches!(
            create_backend("qsound", &BackendOptions::default()),
            Err(Error::UnknownBackend(_))
        ));
    }
}
