//! BBC Micro / Acorn Electron sound multiplexer
//!
//! Up to nine logical voices are spread over the BBC Micro's three tone
//! channels. Each channel plays up to three pitches by cycling through them
//! with a pitch envelope, so a chord becomes a triple of ENVELOPE steps per
//! channel. The output is a compact stream of slot changes read by a small
//! BASIC player program, written as a typeable listing, a listing for BBC
//! BASIC for SDL, a typeable program that assembles the data into memory, or
//! raw bytes for a DFS disk image.

use super::Backend;
use crate::convert::chord::note_numbers;
use crate::error::{Error, Result};
use std::ops::Range;

/// Slot value meaning "no note"
pub const SILENT: u8 = 63;

/// Duration units per second (SOUND durations are in 1/20 s)
pub const UNITS_PER_SECOND: u64 = 20;

/// Longest duration a single record can hold
pub const MAX_UNITS: u64 = 254;

/// Longest line the keyboard buffer accepts when typing the listing
const KEYSTROKE_LIMIT: usize = 238;

/// DATA line limit for SDL listings: room for a line number and DATA in full
const SDL_KEYSTROKE_LIMIT: usize = KEYSTROKE_LIMIT - 5;

/// Data sizes typed faster as hex strings fed to an INPUT loop than as
/// assembler directives
const INPUT_LOOP_BYTES: Range<usize> = 8_000..14_999;

/// Bytes per hex line in the INPUT loop (the loop reads 25 words)
const HEX_LINE_BYTES: usize = 100;

/// Directives per assembler line
const DIRECTIVES_PER_LINE: usize = 15;

/// Record byte flag: this is the last slot changed in the chord
const END_OF_CHORD: u8 = 3 << 6;

/// Grid handed to the dedup engine: one duration unit
const GRID_MICROS: u64 = 1_000_000 / UNITS_PER_SECOND;

/// Player program. Each record is: slot bytes (low 6 bits = pitch/4, high
/// bits = slots to advance - 1, 3 = chord complete), then a duration byte;
/// a zero duration ends the tune.
const BBC_PLAYER: &str = "FOR C%=16 TO 19:SO.C%,0,0,0:N.
N%=0:DIM c%(8)
FOR D%=0 TO 8:c%(D%)=252:N.
REP.C%=0
REP.READ D%
c%(C%)=(D% AND 63)*4
I%=(D% DIV 64)+1:C%=C%+I%:U.I%=4
READ D%
REP.U.ADVAL(-6)>3
FOR I%=0 TO 6 STEP 3
S%=0:T%=0
IF c%(I%)=252:V%=0:ELSE IF c%(I%+1)=252:V%=1:ELSE S%=1:Q%=c%(I%+1)-c%(I%):IF c%(I%+2)=252:V%=2:ELSE R%=c%(I%+2)-c%(I%+1):T%=1:V%=3
IF V%:V%=V%*24+55:N%=N%+1:IF N%=17:N%=1
IF V%:ENV.N%,3,0,Q%,R%,1,S%,T%,V%,0,0,-V%,V%,V%:V%=N%
SO.513+(I%DIV3),V%,c%(I%),D%
N.:U.D%=0:END";

/// Electron player: one channel, so at most three slots
const ELECTRON_PLAYER: &str = "SO.1,0,0,0
N%=0:DIM c%(2)
FOR D%=0 TO 2:c%(D%)=252:N.
REP.C%=0
REP.READ D%
c%(C%)=(D% AND 63)*4
I%=(D% DIV 64)+1:C%=C%+I%:U.I%=4
READ D%
REP.U.ADVAL(-6)>3
S%=0:T%=0:P%=c%(0)
IF P%=252:V%=0:ELSE V%=1:IF c%(1)<>252:S%=1:Q%=c%(1)-P%:IF c%(2)<>252:R%=c%(2)-c%(1):T%=1
IF V%:N%=N%+1:IF N%=17:N%=1
IF V%:ENV.N%,3,0,Q%,R%,1,S%,T%,126,0,0,-126,126,126:V%=N%
SO.1,V%,P%,D%
U.D%=0:END";

/// Typed before the INPUT loop lines; collects hex words until a line ends in *
const INPUT_LOOP: &str =
    "REP.I.A$:IF LEN(A$):F.A%=1TO193STEP8:!P%=EVAL(\"&\"+MID$(A$,A%,8)):P%=P%+4:N.:U.RIGHT$(A$,1)=\"*\":EL.:U.0";

/// Disk player: the BBC Micro player tokenized, reading from memory at TOP
const TOKENIZED_PLAYER: &[u8] = b"\r\x00\n@E%=\xb8P:\xe3C%=16\xb819:\xd4C%,0,0,0:\xed:N%=0:\xdec%(8):\xe3D%=0\xb88:c%(D%)=252:\xed\r\x00\x14\xe5\xf5:C%=0:\xf5:D%=?E%:E%=E%+1:c%(C%)=(D%\x8063)*4:I%=(D%\x8164)+1:C%=C%+I%:\xfdI%=4:D%=?E%:E%=E%+1:\xf5:\xfd\x96-6>3:\xe3I%=0\xb86\x883:S%=0:T%=0:\xe7c%(I%)=252:V%=0:\x8b\xe7c%(I%+1)=252:V%=1:\x8bS%=1:Q%=c%(I%+1)-c%(I%):\xe7c%(I%+2)=252:V%=2:\x8bR%=c%(I%+2)-c%(I%+1):T%=1:V%=3\r\x00\x1e'\xe7V%:V%=V%*24+55:N%=N%+1:\xe7N%=17:N%=1\r\x00(4\xe7V%:\xe2N%,3,0,Q%,R%,1,S%,T%,V%,0,0,-V%,V%,V%:V%=N%\r\x002$\xd4513+(I%\x813),V%,c%(I%),D%:\xed:\xfdD%=0\r\xff";

/// BBC BASIC for SDL before 1.13 mishandles three-step pitch envelopes
const SDL_ENVELOPE_WARNING: &str = "REM As there are chords with three
REM notes per channel, you will need
REM BBC SDL 1.13+ or 'real' BBCBASIC
REM for the ENVELOPEs to sound right.
REM
";

/// BBC BASIC for SDL does not accept keyword abbreviations
const SDL_KEYWORDS: [(&str, &str); 6] = [
    ("D.", "DATA"),
    ("N.", "NEXT"),
    ("U.", "UNTIL"),
    ("SO.", "SOUND"),
    ("REP.", "REPEAT"),
    ("ENV.", "ENVELOPE"),
];

/// Padding inserts for chords of fewer than nine notes: (if shorter than,
/// insert a silent slot this many places from the end). Notes end up spread
/// across channels with any doubling-up in the bass.
const SPREAD_TABLE: [(usize, usize); 6] = [(9, 0), (7, 0), (9, 3), (8, 3), (9, 6), (9, 6)];

/// Target machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    /// Three tone channels, nine slots
    BbcMicro,
    /// One tone channel, three slots
    Electron,
}

impl Machine {
    pub fn slot_count(self) -> usize {
        match self {
            Machine::BbcMicro => 9,
            Machine::Electron => 3,
        }
    }

    fn player(self) -> &'static str {
        match self {
            Machine::BbcMicro => BBC_PLAYER,
            Machine::Electron => ELECTRON_PLAYER,
        }
    }
}

/// How the BBC backends write their output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BbcOutput {
    /// Listing typed in under AUTO, tune held in DATA statements
    #[default]
    Listing,
    /// Numbered listing in full keywords for BBC BASIC for SDL
    Sdl,
    /// Typeable program that assembles the tune into memory above TOP
    Binary,
    /// Tune bytes only, gathered into a DFS disk image by the caller
    Ssd,
}

/// Map a MIDI note to a slot pitch (SOUND pitch / 4), folded by octaves
/// into 0..SILENT
pub fn pitch_code(note: i32) -> u8 {
    let mut n = note - 47;
    while n < 0 {
        n += 12;
    }
    while n >= SILENT as i32 {
        n -= 12;
    }
    n as u8
}

/// Multiplexing backend for the BBC Micro and Acorn Electron
pub struct Multiplexer {
    machine: Machine,
    output: BbcOutput,
    /// Pitch code currently held by each slot
    slots: Vec<u8>,
    /// One entry per emitted chord: slot bytes then the duration byte
    records: Vec<Vec<u8>>,
    /// Some chord put three notes on one channel
    dense: bool,
}

impl Multiplexer {
    pub fn new(machine: Machine, output: BbcOutput) -> Result<Self> {
        if output == BbcOutput::Ssd && machine == Machine::Electron {
            return Err(Error::InvalidOption(
                "disk images hold the BBC Micro player only".to_string(),
            ));
        }
        Ok(Self {
            machine,
            output,
            slots: vec![SILENT; machine.slot_count()],
            records: Vec::new(),
            dense: false,
        })
    }

    /// Current slot contents
    pub fn slots(&self) -> &[u8] {
        &self.slots
    }

    /// Emitted records so far
    pub fn records(&self) -> &[Vec<u8>] {
        &self.records
    }

    /// Assign a chord's notes to slots
    fn assign(&self, pitches: &[f64]) -> Vec<u8> {
        let notes = note_numbers(pitches);
        let keep = notes.len().saturating_sub(self.machine.slot_count());
        let mut codes: Vec<u8> = notes[keep..].iter().map(|&n| pitch_code(n)).collect();
        while codes.len() < 3 {
            codes.push(SILENT);
        }

        if self.machine == Machine::BbcMicro {
            for (shorter_than, from_end) in SPREAD_TABLE {
                if codes.len() < shorter_than {
                    codes.insert(codes.len() - from_end, SILENT);
                }
            }
        }

        // Envelope pitch steps are signed bytes on pitch*4: keep the deltas
        // within +31/-32 codes
        for start in (0..codes.len()).step_by(3) {
            for j in start + 1..(start + 3).min(codes.len()) {
                if codes[j] == SILENT {
                    break;
                }
                let prev = codes[j - 1] as i32;
                let mut cur = codes[j] as i32;
                while cur > prev + 31 {
                    cur -= 12;
                }
                while cur < prev - 32 {
                    cur += 12;
                }
                codes[j] = cur as u8;
            }
        }
        codes
    }

    /// Diff `codes` against the current slots and record the changes
    fn emit(&mut self, codes: &[u8], units: u8) {
        let mut record: Vec<u8> = Vec::new();
        let mut skip = 0u8;
        for i in 0..self.slots.len() {
            if codes[i] == self.slots[i] && !record.is_empty() && skip < 2 {
                skip += 1;
                continue;
            }
            if let Some(last) = record.last_mut() {
                *last += skip << 6;
            }
            skip = 0;
            self.slots[i] = codes[i];
            if codes[i..] == self.slots[i..] {
                record.push(codes[i] | END_OF_CHORD);
                break;
            }
            record.push(codes[i]);
        }
        record.push(units);
        self.records.push(record);
    }

    /// Records as bytes, ending with the zero-duration terminator
    fn data_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.records.iter().flatten().copied().collect();
        out.extend_from_slice(&[255, 0]);
        out
    }

    /// DATA lines holding every record, each at most `limit` keystrokes
    fn data_lines(&self, limit: usize) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        for record in &self.records {
            let data = join_numbers(record);
            match lines.last_mut() {
                Some(last) if fits(last, &data, limit) => {
                    last.push(',');
                    last.push_str(&data);
                }
                _ => lines.push(format!("D.{}", data)),
            }
        }
        match lines.last_mut() {
            Some(last) if last.len() < SDL_KEYSTROKE_LIMIT => last.push_str(",255,0"),
            _ => lines.push("D.255,0".to_string()),
        }
        lines
    }

    fn listing(&self) -> String {
        let mut lines: Vec<String> = self.machine.player().lines().map(String::from).collect();
        lines.extend(self.data_lines(KEYSTROKE_LIMIT));

        // AUTO numbering that stops before 32768 so it ends by itself
        let auto = if lines.len() > 3277 {
            format!("AU.{},1", 32768 - lines.len())
        } else {
            format!("AU.{}", 32770 - 10 * lines.len())
        };
        let mut out = auto;
        for line in &lines {
            out.push('\n');
            out.push_str(line);
        }
        out.push('\n');
        out
    }

    fn sdl_listing(&self) -> String {
        let mut text = String::new();
        if self.dense {
            text.push_str(SDL_ENVELOPE_WARNING);
        }
        text.push_str("COLOUR 128:COLOUR 7:CLS\n");
        text.push_str(self.machine.player());
        for line in self.data_lines(SDL_KEYSTROKE_LIMIT) {
            text.push('\n');
            text.push_str(&line);
        }

        let text = SDL_KEYWORDS
            .iter()
            .fold(text, |text, (short, full)| text.replace(short, full));
        // A zero third step undoes the second when a channel has two notes
        let text = text.replace("V%=1", "V%=1:Q%=0:R%=0");
        let text = match self.machine {
            Machine::BbcMicro => text.replace("V%=2", "V%=2:R%=-Q%"),
            Machine::Electron => text.replace("Q%=c%(1)-P%", "Q%=c%(1)-P%:R%=-Q%"),
        };
        // SDL pitches SOUND an octave low; A% adds the octave back there
        let text = text.replace("N%=0", "A%=-48*((INKEY(-256)AND219)=83):N%=0");
        let text = match self.machine {
            Machine::BbcMicro => text.replace("c%(I%),", "c%(I%)+A%,"),
            Machine::Electron => text.replace("P%,", "P%+A%,"),
        };

        let mut out = String::new();
        for (i, line) in text.split('\n').enumerate() {
            out.push_str(&format!("{}{}\n", i + 1, line));
        }
        out
    }

    /// Program typed at the prompt: the player reading from memory, then the
    /// data put above TOP by the assembler or an INPUT loop
    fn typed_binary(&self) -> String {
        let data = self.data_bytes();
        if data.len() >= INPUT_LOOP_BYTES.end {
            tracing::warn!(
                bytes = data.len(),
                "Output may exceed an emulator's 32K keystroke limit; try pasting 150 lines at a time"
            );
        }
        let input_loop = INPUT_LOOP_BYTES.contains(&data.len());

        // Model B DFS raises PAGE; reclaim it when not on a second processor
        let mut lines = vec![
            "IF(PA. A.&FF00)>&E00:PA.=&E00:*ROM".to_string(),
            "NEW".to_string(),
            format!("0LOMEM=TOP+{}", data.len()),
        ];
        for (i, line) in self.machine.player().lines().enumerate() {
            let line = if i == 0 { format!("E%=TOP:{}", line) } else { line.to_string() };
            lines.push(format!("{}{}", i + 1, line.replace("READ D%", "D%=?E%:E%=E%+1")));
        }
        if input_loop {
            lines.push(format!("P%=TOP:LOMEM=P%+{}", data.len()));
        } else {
            lines.push("P%=TOP".to_string());
        }

        let mut rest: &[u8] = &data;
        if input_loop {
            lines.push(INPUT_LOOP.to_string());
            while rest.len() > HEX_LINE_BYTES {
                let (chunk, tail) = rest.split_at(HEX_LINE_BYTES);
                // Words are stored LSB first
                let hex: String = chunk
                    .chunks(4)
                    .flat_map(|word| word.iter().rev())
                    .map(|b| format!("{:02X}", b))
                    .collect();
                lines.push(hex);
                rest = tail;
            }
            if let Some(last) = lines.last_mut() {
                last.push('*');
            }
        }
        lines.extend(assembler_lines(rest));
        if !input_loop {
            lines.push("LOMEM=P%".to_string());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// `[OPT2` lines assembling `bytes` at P%
fn assembler_lines(mut bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    while !bytes.is_empty() {
        let mut items = vec!["[OPT2".to_string()];
        while !bytes.is_empty() && items.len() <= DIRECTIVES_PER_LINE {
            let (item, used) = directive(bytes);
            items.push(item);
            bytes = &bytes[used..];
        }
        lines.push(format!("{}]", items.join(":")));
    }
    lines
}

/// Shortest directive for the start of `bytes`, and how many bytes it covers
fn directive(bytes: &[u8]) -> (String, usize) {
    match bytes {
        [a, b, c, d, ..] => (format!("EQUD&{:X}", u32::from_le_bytes([*a, *b, *c, *d])), 4),
        // Ending on a lone zero is shorter as BRK
        [a, _, 0] => (single_byte(*a), 1),
        [a, b, ..] => (format!("EQUW{}", u16::from_le_bytes([*a, *b])), 2),
        [a] => (single_byte(*a), 1),
        [] => (String::new(), 0),
    }
}

/// A byte as a 6502 implied-mode mnemonic when one exists
fn single_byte(b: u8) -> String {
    let mnemonic = match b {
        0x00 => "BRK",
        0x0A => "ASLA",
        0x18 => "CLC",
        0x38 => "SEC",
        0x40 => "RTI",
        0x4A => "LSRA",
        0x58 => "CLI",
        0x60 => "RTS",
        0x78 => "SEI",
        0xB8 => "CLV",
        0xD8 => "CLD",
        0xEA => "NOP",
        0xF8 => "SED",
        _ => return format!("EQUB{}", b),
    };
    mnemonic.to_string()
}

/// DFS file name for a tune: the input's base name when it is 1 to 7
/// alphanumerics, otherwise TUNE and its position on the disk
pub fn dfs_file_name(input: &std::path::Path, position: usize) -> String {
    let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    let stem = if lower.ends_with(".midi") {
        &name[..name.len() - 5]
    } else if lower.ends_with(".mid") {
        &name[..name.len() - 4]
    } else {
        &name[..]
    };
    if (1..=7).contains(&stem.len()) && stem.chars().all(|c| c.is_ascii_alphanumeric()) {
        stem.to_string()
    } else {
        format!("TUNE{}", position)
    }
}

/// Catalogue slots after !BOOT
const DFS_MAX_FILES: usize = 30;

const DFS_SECTOR: usize = 256;

/// Build a single-sided DFS disk image holding one player per tune, plus a
/// !BOOT file that runs the tune (or lists the disk for several)
pub fn dfs_image(files: &[(String, Vec<u8>)], title: &str, copyright: Option<&str>) -> Result<Vec<u8>> {
    if files.len() > DFS_MAX_FILES {
        return Err(Error::DiskImage(format!("catalogue full: {} files", files.len())));
    }
    if let Some((name, _)) = files
        .iter()
        .find(|(name, _)| name.is_empty() || name.len() > 7 || !name.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return Err(Error::DiskImage(format!("file names must be 1 to 7 alphanumerics: {:?}", name)));
    }

    let mut title = title.as_bytes().to_vec();
    title.resize(12, 0);
    let mut names = vec![0u8; 31 * 8];
    let mut info = vec![0u8; 31 * 8];

    let mut boot = String::from("*BASIC\r");
    if let Some(copyright) = copyright {
        boot.push_str(&format!("\rREM {}\r\r", copyright));
    }
    match files {
        [(name, _)] => boot.push_str(&format!("LOAD \"{}\"\rLIST\rRUN\r", name)),
        _ => {
            boot.push_str("*CAT\r");
            let chains: Vec<String> = files.iter().map(|(name, _)| format!("CH.\"{}\"\r", name)).collect();
            boot.push_str(&chains.join("REP.U.AD.-6=15:"));
        }
    }
    let mut data = boot.into_bytes();
    names[..8].copy_from_slice(b"!BOOT  $");
    info[4] = (data.len() & 0xFF) as u8;
    info[5] = (data.len() >> 8) as u8;
    info[7] = 2;
    pad_sector(&mut data);

    for (index, (name, tune)) in files.iter().enumerate() {
        // Tokenized LOMEM=TOP+n, so BASIC variables start past the tune
        let mut lomem = vec![0xD2, b'=', 0xB8, b'P', b'+'];
        lomem.extend_from_slice(tune.len().saturating_sub(1).to_string().as_bytes());
        let mut file = vec![b'\r', 0, 0, lomem.len() as u8 + 4];
        file.extend_from_slice(&lomem);
        file.extend_from_slice(TOKENIZED_PLAYER);
        file.extend_from_slice(tune);
        if file.len() > 0xFFFF {
            return Err(Error::DiskImage(format!("{} is too long: {} bytes", name, file.len())));
        }

        let slot = (index + 1) * 8;
        names[slot..slot + 7].copy_from_slice(format!("{:<7}", name).as_bytes());
        names[slot + 7] = b'$';
        let start = 2 + data.len() / DFS_SECTOR;
        info[slot + 4] = (file.len() & 0xFF) as u8;
        info[slot + 5] = (file.len() >> 8) as u8;
        info[slot + 6] = (start >> 8) as u8;
        info[slot + 7] = (start & 0xFF) as u8;

        data.extend_from_slice(&file);
        pad_sector(&mut data);
    }

    let sectors = match 2 + data.len() / DFS_SECTOR {
        n if n < 400 => 400,
        n if n < 800 => 800,
        n => return Err(Error::DiskImage(format!("disk image too full: {} sectors", n))),
    };
    // *OPT4,3: !BOOT is *EXECed
    let boot_option = 3;

    let mut out = Vec::with_capacity(2 * DFS_SECTOR + data.len());
    out.extend_from_slice(&title[..8]);
    out.extend_from_slice(&names);
    out.extend_from_slice(&title[8..12]);
    out.push(1);
    out.push(((1 + files.len()) * 8) as u8);
    out.push(((sectors >> 8) + 16 * boot_option) as u8);
    out.push((sectors & 0xFF) as u8);
    out.extend_from_slice(&info);
    out.extend_from_slice(&data);
    while out.last() == Some(&0) {
        out.pop();
    }
    Ok(out)
}

fn pad_sector(data: &mut Vec<u8>) {
    let padded = data.len().div_ceil(DFS_SECTOR) * DFS_SECTOR;
    data.resize(padded, 0);
}

fn join_numbers(bytes: &[u8]) -> String {
    bytes.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",")
}

/// Whether `data` can be appended to a DATA line
fn fits(line: &str, data: &str, limit: usize) -> bool {
    line.len() + data.len() + 1 <= limit
}

impl Backend for Multiplexer {
    fn name(&self) -> &'static str {
        match self.machine {
            Machine::BbcMicro => "bbc",
            Machine::Electron => "electron",
        }
    }

    fn extension(&self) -> &'static str {
        match self.output {
            BbcOutput::Ssd => ".ssd",
            _ => ".bas",
        }
    }

    fn is_text(&self) -> bool {
        self.output != BbcOutput::Ssd
    }

    fn quantization_grid(&self) -> Option<u64> {
        Some(GRID_MICROS)
    }

    fn init(&mut self) {
        self.slots = vec![SILENT; self.machine.slot_count()];
        self.records.clear();
        self.dense = false;
    }

    fn render_chord(&mut self, pitches: &[f64], duration: u64) {
        let mut units = (duration * UNITS_PER_SECOND + 500_000) / 1_000_000;
        if units == 0 {
            return;
        }
        // Beyond two notes per channel on average, some channel holds three
        let slots = self.machine.slot_count();
        if pitches.len().min(slots) > 2 * slots / 3 {
            self.dense = true;
        }
        let codes = self.assign(pitches);
        while units > MAX_UNITS {
            self.emit(&codes, MAX_UNITS as u8);
            units -= MAX_UNITS;
        }
        if units > 0 {
            self.emit(&codes, units as u8);
        }
    }

    fn finalize(&mut self) -> Vec<u8> {
        match self.output {
            BbcOutput::Listing => self.listing().into_bytes(),
            BbcOutput::Sdl => self.sdl_listing().into_bytes(),
            BbcOutput::Binary => self.typed_binary().into_bytes(),
            BbcOutput::Ssd => self.data_bytes(),
        }
    }
}
