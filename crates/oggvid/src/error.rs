//! Load-time error types.
//!
//! Only failures that make a clip unusable surface as errors. Per-tick
//! decode conditions (short reads, rejected packets) are recovered inside
//! the decode loops and never propagate past them.

use std::fmt;
use std::io;

/// Errors that can occur while loading a clip.
#[derive(Debug)]
pub enum ClipError {
    /// Header negotiation could not identify the required logical streams
    /// before end-of-data.
    MalformedStream(String),
    /// A recognized stream uses a codec/bit-depth/channel layout the
    /// decoder does not support.
    UnsupportedFormat(String),
    /// `load` was called on a clip that already owns a byte source.
    AlreadyLoaded(String),
    /// The underlying byte source failed.
    Io(io::Error),
}

impl fmt::Display for ClipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipError::MalformedStream(msg) => write!(f, "Malformed stream: {msg}"),
            ClipError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            ClipError::AlreadyLoaded(name) => write!(f, "Clip '{name}' is already loaded"),
            ClipError::Io(err) => write!(f, "Stream I/O error: {err}"),
        }
    }
}

impl std::error::Error for ClipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClipError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ClipError {
    fn from(err: io::Error) -> Self {
        ClipError::Io(err)
    }
}
