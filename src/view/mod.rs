//! Derived read-only views over a stored raw message.
//!
//! Nothing here is persisted: both views are recomputed from the raw bytes
//! on every call, so identical input always yields identical output.

pub mod imf;
pub mod mime;

pub use imf::{read_basic, BasicInfo};
pub use mime::{read_contents, ContentInfo};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The raw bytes could not be parsed as a message at all.
    #[error("cannot parse message")]
    Message,

    /// A multipart node referenced a part that does not exist in the
    /// parsed tree. `depth` counts enclosing multiparts, `index` is the
    /// sibling position inside the innermost one.
    #[error("broken part reference at depth {depth}, part {index}")]
    Structure { depth: usize, index: usize },
}
