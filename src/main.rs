use clap::Parser;
use midibeep::backends::{self, bbc, BackendOptions, BbcOutput};
use midibeep::{ConvertOptions, Converter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "midibeep")]
#[command(version = "0.1.0")]
#[command(about = "Convert MIDI files to beeper and retro computer music", long_about = None)]
struct Args {
    /// Input MIDI files
    #[arg(required_unless_present = "list_backends")]
    files: Vec<PathBuf>,

    /// Output backend (bbc when a --bbc-* option is given, otherwise beep)
    #[arg(short, long)]
    backend: Option<String>,

    /// BBC backends: typeable program that assembles the tune into memory
    #[arg(long, conflicts_with_all = ["bbc_ssd", "bbc_sdl"])]
    bbc_binary: bool,

    /// BBC Micro: write one DFS disk image holding every tune
    #[arg(long, conflicts_with = "bbc_sdl")]
    bbc_ssd: bool,

    /// BBC backends: listing for BBC BASIC for SDL
    #[arg(long)]
    bbc_sdl: bool,

    /// Disk image title, also naming the image file
    #[arg(long, env = "DFS_TITLE")]
    disk_title: Option<String>,

    /// Copyright line added to the disk's !BOOT file
    #[arg(long, env = "BOOT_COPYRIGHT")]
    boot_copyright: Option<String>,

    /// Play only the highest note of each chord
    #[arg(short, long)]
    monophonic: bool,

    /// Stop after this many seconds (0 = no limit)
    #[arg(long, env = "maxTime", default_value_t = 0.0)]
    max_time: f64,

    /// Output directory, or - for stdout (defaults to each input's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List available backends
    #[arg(short = 'L', long)]
    list_backends: bool,
}

fn main() -> Result<ExitCode, midibeep::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.list_backends {
        for name in backends::list_backends() {
            println!("{}", name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let options = ConvertOptions {
        backend: args.backend_name().to_string(),
        backend_options: BackendOptions {
            bbc_output: args.bbc_output(),
        },
        monophonic: args.monophonic,
        max_time_us: (args.max_time > 0.0).then(|| (args.max_time * 1_000_000.0) as u64),
    };
    let mut converter = Converter::new(&options)?;

    let mut failed = 0;
    let mut disk_files: Vec<(String, Vec<u8>)> = Vec::new();
    for file in &args.files {
        let result = converter.convert_file(file).and_then(|data| {
            if args.bbc_ssd {
                disk_files.push((bbc::dfs_file_name(file, disk_files.len() + 1), data));
                Ok(())
            } else {
                write_output(file, args.output.as_deref(), converter.backend().extension(), &data)
            }
        });
        if let Err(e) = result {
            tracing::error!("{}: {}", file.display(), e);
            failed += 1;
        }
    }

    if !disk_files.is_empty() {
        let title = args.disk_title.as_deref().unwrap_or("");
        let result = bbc::dfs_image(&disk_files, title, args.boot_copyright.as_deref())
            .and_then(|image| write_disk_image(args.output.as_deref(), title, &image));
        if let Err(e) = result {
            tracing::error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    }

    if failed > 0 {
        tracing::warn!("{} of {} files failed", failed, args.files.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

impl Args {
    fn backend_name(&self) -> &str {
        match &self.backend {
            Some(name) => name,
            None if self.bbc_output() != BbcOutput::Listing => "bbc",
            None => "beep",
        }
    }

    fn bbc_output(&self) -> BbcOutput {
        if self.bbc_binary {
            BbcOutput::Binary
        } else if self.bbc_ssd {
            BbcOutput::Ssd
        } else if self.bbc_sdl {
            BbcOutput::Sdl
        } else {
            BbcOutput::Listing
        }
    }
}

/// Input name with any .mid/.midi extension replaced by `extension`
fn output_name(input: &Path, extension: &str) -> PathBuf {
    let stem = match input.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi") => input.with_extension(""),
        _ => input.to_path_buf(),
    };
    let name = stem.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    PathBuf::from(format!("{}{}", name, extension))
}

fn write_output(input: &Path, dir: Option<&Path>, extension: &str, data: &[u8]) -> midibeep::error::Result<()> {
    let path = match dir {
        Some(dir) if dir == Path::new("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            return Ok(());
        }
        Some(dir) => dir.join(output_name(input, extension)),
        None => input
            .parent()
            .unwrap_or(Path::new(""))
            .join(output_name(input, extension)),
    };
    std::fs::write(&path, data)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

/// Write the disk image as `<title>.ssd` ("tunes.ssd" when untitled)
fn write_disk_image(dir: Option<&Path>, title: &str, image: &[u8]) -> midibeep::error::Result<()> {
    let name = format!("{}.ssd", if title.is_empty() { "tunes" } else { title });
    let path = match dir {
        Some(dir) if dir == Path::new("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(image)?;
            stdout.flush()?;
            return Ok(());
        }
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    };
    std::fs::write(&path, image)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}
