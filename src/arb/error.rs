//! Errors of the command and beacon protocols.

use crate::error::RackError;
use thiserror::Error;

/// Everything that can go wrong handling one command or datagram.
///
/// On the server side these never cross the wire as protocol failures; they
/// are rendered into the response payload instead.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed method call: {0}")]
    Malformed(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("{method}() takes {expected} argument(s) but {given} were given")]
    Arity {
        method: String,
        expected: usize,
        given: usize,
    },

    #[error("argument {index} of {method}() must be {expected}, got {found}")]
    ArgumentType {
        method: String,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{method}() failed: {message}")]
    Execution { method: String, message: String },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed beacon: {0}")]
    MalformedBeacon(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for RackError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => RackError::NetworkError(e.to_string()),
            other => RackError::ProtocolError(other.to_string()),
        }
    }
}
