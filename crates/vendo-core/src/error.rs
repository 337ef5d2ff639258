//! Error types for the ledger core.

/// Ledger errors.
///
/// Nothing here is fatal to a server process; every variant is a
/// per-request outcome.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No user record for the presented card token.
    #[error("user not found: {card_id}")]
    UserNotFound { card_id: String },

    /// No unit record with this name.
    #[error("unit not found: {name}")]
    UnitNotFound { name: String },

    /// Heartbeat credential does not match the one provisioned at
    /// auto-registration.
    #[error("unit credential mismatch: {name}")]
    Unauthorized { name: String },

    /// Stock is already zero, or a concurrent usage consumed the last unit
    /// of stock first.
    #[error("no stock remaining for {card_id}")]
    Exhausted { card_id: String },

    /// Duplicate registration attempt for an existing card token.
    #[error("card already registered: {card_id}")]
    AlreadyRegistered { card_id: String },

    /// Request rejected at the boundary (missing or malformed fields).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Stored state could not be decoded (bad timestamp, bad history JSON).
    #[error("corrupt stored state: {message}")]
    Corrupt { message: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

impl LedgerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        LedgerError::Corrupt {
            message: message.into(),
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
