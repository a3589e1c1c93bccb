//! Unified error type for the token ledger and its surrounding workflows.
//!
//! Variants carry the structured data a caller needs to build a user-facing
//! response (e.g. the shortfall on an insufficient balance) instead of a
//! pre-formatted message.

use sea_orm::DbErr;
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Amount was zero or negative where a positive amount is required
    #[error("Invalid amount: {amount} (must be a positive number of tokens)")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// A spend asked for more tokens than the user holds
    #[error("Insufficient balance: {required} tokens required, {balance} available")]
    InsufficientBalance {
        /// Tokens the operation needed
        required: i64,
        /// Tokens the user held when the spend was attempted
        balance: i64,
    },

    /// Transaction type does not match the operation, or is not recognized
    #[error("Transaction type '{transaction_type}' cannot be used for {operation}")]
    InvalidTransactionType {
        /// The offending type string
        transaction_type: String,
        /// The operation that rejected it
        operation: &'static str,
    },

    /// An idempotency key was reused with different arguments
    #[error("Idempotency key '{key}' was already used for a different request")]
    IdempotencyConflict {
        /// The reused key
        key: String,
    },

    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record (e.g. "advertisement")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The caller does not own the record
    #[error("User {user_id} does not own {entity} {id}")]
    Forbidden {
        /// Kind of record
        entity: &'static str,
        /// Identifier of the record
        id: String,
        /// The user that attempted the action
        user_id: String,
    },

    /// The record is not in a state that allows the requested transition
    #[error("{entity} {id} cannot be activated from status {status}")]
    InvalidState {
        /// Kind of record
        entity: &'static str,
        /// Identifier of the record
        id: String,
        /// Current status
        status: String,
    },

    /// Payout requested by a flagged or paused user
    #[error("Payouts are blocked for user {user_id}: {reason}")]
    PayoutBlocked {
        /// The blocked user
        user_id: String,
        /// Why payouts are blocked
        reason: String,
    },

    /// Too many requests inside the current rate-limit window
    #[error("Rate limit exceeded for '{key}', retry in {retry_after_secs}s")]
    RateLimited {
        /// The limited key
        key: String,
        /// Seconds until the window resets
        retry_after_secs: u64,
    },

    /// Optimistic concurrency retries were exhausted
    #[error("Concurrent modification of {resource}, please retry")]
    ConcurrentModification {
        /// The contended resource
        resource: &'static str,
    },

    /// Input failed a business-rule check
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the failure
        message: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the failure
        message: String,
    },

    /// Storage failure; the surrounding transaction has been rolled back
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Transaction metadata could not be (de)serialized
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// I/O failure (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code a web layer should answer with for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAmount { .. }
            | Self::InsufficientBalance { .. }
            | Self::InvalidTransactionType { .. }
            | Self::InvalidState { .. }
            | Self::PayoutBlocked { .. }
            | Self::Validation { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::IdempotencyConflict { .. } | Self::ConcurrentModification { .. } => 409,
            Self::RateLimited { .. } => 429,
            Self::Config { .. } | Self::Database(_) | Self::Metadata(_) | Self::Io(_) => 500,
        }
    }

    /// Tokens missing for an `InsufficientBalance` error, `None` for anything else.
    #[must_use]
    pub const fn shortfall(&self) -> Option<i64> {
        match self {
            Self::InsufficientBalance { required, balance } => Some(*required - *balance),
            _ => None,
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
