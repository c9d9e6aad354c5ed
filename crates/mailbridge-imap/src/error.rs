//! Failures of a mailbox session.

use std::time::Duration;

use thiserror::Error;

/// Everything a session step can fail with.
///
/// The variants split into two groups. Rejections (`Auth`, `No`, `Bad`,
/// `InvalidState`, `Parse`) leave the connection usable for `LOGOUT`; the
/// rest are fatal, see [`Error::is_fatal`].
#[derive(Debug, Error)]
pub enum Error {
    /// Socket read, write or connect failed.
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or record layer failed.
    #[error("TLS failure: {0}")]
    Tls(#[from] rustls::Error),

    /// Host cannot be used as a certificate name.
    #[error("invalid TLS server name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Server output could not be parsed.
    #[error("malformed server response at byte {position}: {message}")]
    Parse {
        /// Offset into the response buffer.
        position: usize,
        /// What the parser expected.
        message: String,
    },

    /// `LOGIN` was refused or not offered.
    #[error("login rejected: {0}")]
    Auth(String),

    /// Tagged `NO`.
    #[error("server refused: {0}")]
    No(String),

    /// Tagged `BAD`.
    #[error("server rejected command: {0}")]
    Bad(String),

    /// Server closed the session, either in the greeting or mid-command.
    #[error("server closed the session: {0}")]
    Bye(String),

    /// A command round-trip or a streamed item took too long.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Step not allowed in the current session state.
    #[error("{0}")]
    InvalidState(String),

    /// Server broke the protocol, e.g. a literal cut short.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// True when the connection can no longer be trusted for further commands.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Bye(_) | Self::Timeout(_) | Self::Protocol(_)
        )
    }
}

/// Session result.
pub type Result<T> = std::result::Result<T, Error>;
