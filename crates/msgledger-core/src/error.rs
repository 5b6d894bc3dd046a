//! Error types for msgledger.

use crate::ids::IdError;

/// Result type for msgledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in msgledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A purchase or grant amount failed validation. Nothing was written.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Top-up not found.
    #[error("top-up not found: {topup_id}")]
    TopUpNotFound {
        /// The top-up ID that was not found.
        topup_id: String,
    },

    /// Message not found.
    #[error("message not found: {msg_id}")]
    MessageNotFound {
        /// The message ID that was not found.
        msg_id: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = LedgerError::InvalidAmount("credits must be positive".into());
        assert_eq!(err.to_string(), "invalid amount: credits must be positive");

        let err = LedgerError::TopUpNotFound {
            topup_id: "abc".into(),
        };
        assert_eq!(err.to_string(), "top-up not found: abc");
    }

    #[test]
    fn id_error_converts() {
        let err: LedgerError = IdError::InvalidUlid.into();
        assert!(matches!(err, LedgerError::InvalidId(_)));
    }
}
