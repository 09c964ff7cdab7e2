//! Error types for docstoredb

use std::io;

use thiserror::Error;

/// Result type alias for docstoredb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while writing or reading a spill artifact
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Spill artifact could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed key or artifact envelope
    #[error("Parse error: {0}")]
    Parse(String),

    /// Blank key, blank metadata name, empty payload or bad limit
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No document stored under the key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document larger than the configured byte ceiling
    #[error("Document too large: {size} bytes (limit {limit})")]
    DocumentTooLarge {
        /// Size of the rejected document
        size: usize,
        /// Byte ceiling in effect
        limit: usize,
    },

    /// Global undo on an empty command stack
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Targeted undo found no command for the key
    #[error("No undoable action for {0}")]
    NoMatchingUndo(String),

    /// `remove()` on an empty heap
    #[error("Heap is empty")]
    EmptyHeap,
}

impl<'a> From<nom::Err<nom::error::Error<&'a str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&'a str>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}
