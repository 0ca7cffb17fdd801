use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected end of input at offset {offset} (wanted {wanted} bytes)")]
    TruncatedInput { offset: usize, wanted: usize },

    #[error("Unsupported fixed read width: {0} bytes")]
    InvalidReadWidth(usize),

    #[error("Invalid MIDI header: {0}")]
    InvalidHeader(String),

    #[error("Event at offset {offset} runs past the end of track {track}")]
    InvalidEventLength { track: usize, offset: usize },

    #[error("Data byte at offset {offset} with no running status")]
    MissingRunningStatus { offset: usize },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Cannot build disk image: {0}")]
    DiskImage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
