pub mod backends;
pub mod convert;
pub mod error;
pub mod smf;

pub use convert::{ConvertOptions, Converter};
pub use error::Error;
