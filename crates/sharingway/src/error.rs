//! Error types for the Sharingway protocol layer.

use std::io;

/// Why a region's contents could not be decoded.
#[derive(Debug)]
pub enum DecodeError {
    /// The length header is outside `0 < N <= capacity - 4`.
    BadLength { len: u32, capacity: usize },
    /// The payload bytes are not valid UTF-8.
    InvalidUtf8,
    /// The payload text is not a valid document.
    Json(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::BadLength { len, capacity } => {
                write!(f, "length header {len} invalid for capacity {capacity}")
            }
            DecodeError::InvalidUtf8 => write!(f, "payload is not valid UTF-8"),
            DecodeError::Json(e) => write!(f, "payload is not a valid document: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors surfaced by the Sharingway API.
///
/// Only construction-time [`Error::Unavailable`] is fatal to its owner;
/// every other kind is recoverable and the operation may be retried.
#[derive(Debug)]
pub enum Error {
    /// A named resource could not be attached or created.
    Unavailable(String),
    /// A cross-process lock could not be acquired within its timeout.
    Locked,
    /// The encoded document does not fit the region.
    Oversize { len: usize, capacity: usize },
    /// The document could not be serialized.
    Encode(serde_json::Error),
    /// The region's contents could not be decoded.
    Decode(DecodeError),
    /// No registry entry or subscription with this name.
    NotFound(String),
    /// Operation before `initialize` or after `shutdown`.
    NotInitialized,
}

impl Error {
    pub(crate) fn unavailable(what: &str, err: io::Error) -> Self {
        Error::Unavailable(format!("{what}: {err}"))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unavailable(reason) => write!(f, "resource unavailable: {reason}"),
            Error::Locked => write!(f, "cross-process lock timed out"),
            Error::Oversize { len, capacity } => {
                write!(f, "document of {len} bytes exceeds region capacity {capacity}")
            }
            Error::Encode(e) => write!(f, "document encoding failed: {e}"),
            Error::Decode(e) => write!(f, "document decoding failed: {e}"),
            Error::NotFound(name) => write!(f, "no entry named {name:?}"),
            Error::NotInitialized => write!(f, "not initialized"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Encode(e) => Some(e),
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
