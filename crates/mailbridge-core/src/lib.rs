//! # mailbridge-core
//!
//! The operations behind the mailbridge tools.
//!
//! This crate provides:
//! - **Configuration** read from environment variables, with no built-in
//!   credentials
//! - **Message decoding**: raw RFC 5322 bytes to a flat [`EmailRecord`]
//! - **Fetch aggregation**: concurrent decoding of a streaming IMAP fetch
//! - **Retrieval**: the most recent unseen inbox messages, one session per
//!   call
//! - **Sending**: plain text mail through SMTP
//!
//! ```text
//! Retriever ──connect──→ Session ──search UNSEEN──→ ids ──fetch──→ FetchStream
//!                                                                   │
//!                                            aggregate (JoinSet) ◀──┘
//!                                                   │
//!                                          Vec<EmailRecord> ──→ close
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod aggregate;
pub mod config;
pub mod decoder;
mod error;
pub mod retrieve;
pub mod send;

pub use aggregate::aggregate;
pub use config::{Config, ConfigError, MailboxConfig, SmtpConfig};
pub use decoder::{DecodeError, EmailRecord, decode};
pub use error::{MailError, Result};
pub use retrieve::{
    DEFAULT_LIMIT, ImapConnector, MAX_LIMIT, MIN_LIMIT, MailboxConnector, RetrievalResult,
    Retriever,
};
pub use send::{MailTransport, SendRequest, Sender, SmtpTransport};
