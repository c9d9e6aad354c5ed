//! Error taxonomy for the tool operations.

use thiserror::Error;

/// Errors surfaced by retrieval and sending.
///
/// Each variant carries the message of the failure it wraps. `Validation` is
/// the only one caused by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// Caller supplied bad arguments. Nothing was contacted.
    #[error("{0}")]
    Validation(String),

    /// Connecting or logging in to the mailbox store failed.
    #[error("IMAP error: {0}")]
    Connection(String),

    /// The inbox could not be selected.
    #[error("Failed to open inbox: {0}")]
    Folder(String),

    /// The search was rejected or interrupted.
    #[error("Failed to search messages: {0}")]
    Search(String),

    /// The fetch stream failed.
    #[error("Failed to fetch messages: {0}")]
    Fetch(String),

    /// A fetched message could not be decoded.
    #[error("Failed to process messages: {0}")]
    Decode(String),

    /// Submission failed.
    #[error("Failed to send email: {0}")]
    Send(String),

    /// A worker task failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MailError {
    /// True for errors caused by the caller's input.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias using [`MailError`].
pub type Result<T> = std::result::Result<T, MailError>;
