//! Centralized error types for imapindexer.

use thiserror::Error;

/// All errors produced by the imapindexer library.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// The mail server could not be reached or the TLS handshake failed.
    #[error("Cannot connect to IMAP server '{address}': {reason}")]
    Connection { address: String, reason: String },

    /// The server rejected the credentials.
    #[error("IMAP login failed for '{username}': {reason}")]
    Authentication { username: String, reason: String },

    /// Listing mailboxes failed, so there is nothing to schedule.
    #[error("Mailbox discovery failed: {0}")]
    Discovery(String),

    /// A mailbox could not be selected.
    #[error("Cannot select mailbox '{mailbox}': {reason}")]
    Select { mailbox: String, reason: String },

    /// Any other protocol-level failure (fetch, status, logout).
    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    /// The configuration cannot drive a run.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, IndexerError>`.
pub type Result<T> = std::result::Result<T, IndexerError>;

impl IndexerError {
    /// Create a `Connection` variant from an address and any displayable cause.
    pub fn connection(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a `Select` variant from a mailbox name and any displayable cause.
    pub fn select(mailbox: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Select {
            mailbox: mailbox.into(),
            reason: reason.to_string(),
        }
    }
}
