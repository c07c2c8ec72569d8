use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds exposed at the public API boundary, and internally whenever a fallible
/// operation needs to distinguish "absent" from "broken".
#[derive(Error, Debug)]
pub enum Error {
    /// The requested key is absent, or its newest record is a deletion. `Get` never
    /// distinguishes the two cases to the caller.
    #[error("key not found")]
    NotFound,

    /// A record's on-disk framing did not parse, or a checksum mismatched.
    #[error("corruption detected reading key {key:?}: {reason}")]
    Corruption { key: Option<Vec<u8>>, reason: String },

    /// An operation or option combination this engine does not implement.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A caller-supplied argument is invalid (e.g. a malformed range, or an unknown option).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A physical I/O failure. The engine never retries these.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    #[must_use]
    pub fn corruption(key: impl Into<Option<Vec<u8>>>, reason: impl Into<String>) -> Self {
        Self::Corruption { key: key.into(), reason: reason.into() }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
