//! Error types for transaction coordination.
//!
//! A single error enum is shared by the transaction manager, the coordinator
//! and every collaborator callback, so that a failure raised deep inside a
//! listener surfaces unchanged from `commit()`.

use thiserror::Error;

/// All txnsync errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No transaction is active on the calling thread.
    ///
    /// Raised by every coordinator operation that requires a transaction.
    /// This always indicates a programming error in the caller.
    #[error("no active transaction: {0}")]
    NoTransaction(String),

    /// The transaction manager was driven in an invalid order
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A resource is bound under the key but holds another type
    #[error("wrong type for resource '{key}': expected {expected}")]
    WrongType {
        /// Resource key
        key: String,
        /// Requested type name
        expected: &'static str,
    },

    /// Integrity check failed during flush
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Concurrent modification detected; the unit of work may be retried
    #[error("concurrency failure: {0}")]
    ConcurrencyFailure(String),

    /// Commit was requested but the transaction was marked rollback-only
    #[error("transaction rolled back: {0}")]
    UnexpectedRollback(String),

    /// A listener or participant failed
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    /// The retrying helper gave up
    #[error("gave up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error returned by the last attempt
        source: Box<Error>,
    },

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for txnsync operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a collaborator failure.
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Error::Collaborator(msg.into())
    }

    /// Check if this error is retryable.
    ///
    /// Only concurrency failures may succeed when the unit of work is run
    /// again in a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrencyFailure(_))
    }

    /// Check if this error signals use of the coordinator outside a transaction.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::NoTransaction(_))
    }
}
