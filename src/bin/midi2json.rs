//! MIDI to JSON dumper

use clap::Parser;
use midibeep::backends::{self, BackendOptions};
use midibeep::convert;
use midibeep::smf::{self, ChordsJson, SmfJson};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "midi2json")]
#[command(version = "0.1.0")]
#[command(about = "Dump decoded MIDI files or their chord streams as JSON", long_about = None)]
struct Args {
    /// Input MIDI file
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,

    /// Dump the deduplicated chord stream instead of the raw events
    #[arg(long)]
    chords: bool,

    /// Quantize chords to this backend's grid (with --chords)
    #[arg(short, long)]
    backend: Option<String>,

    /// Keep only the highest pitch of each chord (with --chords)
    #[arg(short, long)]
    monophonic: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let data = std::fs::read(&args.input)?;
    let smf = smf::parse(&data)?;

    let value = if args.chords {
        let grid = match &args.backend {
            Some(name) => backends::create_backend(name, &BackendOptions::default())?.quantization_grid(),
            None => None,
        };
        let chords = convert::chords(&smf, grid, args.monophonic, None);
        serde_json::to_value(ChordsJson::new(chords))?
    } else {
        serde_json::to_value(SmfJson::new(&smf))?
    };

    let json_string = if args.compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json_string.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", json_string);
        }
    }

    Ok(())
}
