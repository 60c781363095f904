//! Error types for rackshare.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for rackshare operations.
#[derive(Error, Debug)]
pub enum RackError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The mutex file guarding a queue could not be acquired within the retry budget.
    #[error("Lock acquisition failed: {0}")]
    LockingError(String),

    /// Logical misuse of the arbiter (e.g. releasing a resource not held).
    #[error("Arbiter error: {0}")]
    ArbiterError(String),

    /// Persisted queue data is missing or malformed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A peer answered with something that does not follow the command protocol.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Socket-level failure (bind, connect, send, receive).
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl RackError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RackError::UserError(_) => exit_codes::USER_ERROR,
            RackError::LockingError(_) => exit_codes::LOCK_FAILURE,
            RackError::ArbiterError(_) => exit_codes::ARBITER_FAILURE,
            RackError::StorageError(_) => exit_codes::STORAGE_FAILURE,
            RackError::ProtocolError(_) | RackError::NetworkError(_) => {
                exit_codes::NETWORK_FAILURE
            }
        }
    }
}

/// Result type alias for rackshare operations.
pub type Result<T> = std::result::Result<T, RackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locking_error_has_correct_exit_code() {
        let err = RackError::LockingError("mutex busy".to_string());
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
    }

    #[test]
    fn arbiter_error_has_correct_exit_code() {
        let err = RackError::ArbiterError("not held".to_string());
        assert_eq!(err.exit_code(), exit_codes::ARBITER_FAILURE);
    }

    #[test]
    fn network_and_protocol_share_exit_code() {
        let a = RackError::NetworkError("refused".to_string());
        let b = RackError::ProtocolError("short frame".to_string());
        assert_eq!(a.exit_code(), b.exit_code());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = RackError::StorageError("queue file 'x.json' is missing".to_string());
        assert_eq!(err.to_string(), "Storage error: queue file 'x.json' is missing");

        let err = RackError::UserError("bad argument".to_string());
        assert_eq!(err.to_string(), "bad argument");
    }
}
