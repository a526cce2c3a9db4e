mod envelope;
mod error;
mod file;
mod message;
mod normalize;
mod records;

pub use envelope::*;
pub use error::*;
pub use file::*;
pub use message::*;
pub use normalize::{normalize, normalize_message, normalize_parts};
pub use records::*;
