pub mod events;
pub mod json;
pub mod parser;
pub mod reader;
pub mod writer;

pub use events::{Message, TrackEvent};
pub use json::{ChordsJson, SmfJson};
pub use parser::{parse, Format, Header, Smf, SmfParser, Timing};
pub use reader::ByteReader;
pub use writer::SmfWriter;
