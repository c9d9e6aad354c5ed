//! SMTP connection management with type-state pattern.

mod client;
mod config;
mod stream;
mod transaction;

pub use client::{
    Authenticated, Client, Connected, Data, MailReady, MailTransaction, RecipientAdded,
};
pub use config::{
    Config, ConfigBuilder, DEFAULT_CLIENT_NAME, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT,
    Security,
};
pub use stream::{SmtpStream, connect};
pub use transaction::{Credentials, deliver, send};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server identity and capabilities from the greeting and EHLO.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if the server accepts 8-bit bodies.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// `Some` when SIZE was advertised; the inner value is the limit, if any.
    #[must_use]
    pub fn size_extension(&self) -> Option<Option<usize>> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(limit) => Some(*limit),
            _ => None,
        })
    }

    /// Returns the maximum message size, if advertised. A limit of zero
    /// means no fixed limit.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.size_extension().flatten().filter(|&limit| limit > 0)
    }

    /// Usable mechanisms from the AUTH extension, or `None` when the server
    /// did not advertise AUTH at all.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Option<&[AuthMechanism]> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(lines: &[&str]) -> ServerInfo {
        ServerInfo {
            hostname: "smtp.example.com".into(),
            extensions: lines.iter().map(|l| Extension::parse(l)).collect(),
        }
    }

    #[test]
    fn capability_queries() {
        let info = info(&["STARTTLS", "8BITMIME", "SIZE 1000", "AUTH LOGIN PLAIN"]);
        assert!(info.supports_starttls());
        assert!(info.supports_8bitmime());
        assert_eq!(info.max_message_size(), Some(1000));
        assert_eq!(
            info.auth_mechanisms(),
            Some([AuthMechanism::Login, AuthMechanism::Plain].as_slice())
        );
    }

    #[test]
    fn bare_or_zero_size_has_no_limit() {
        assert_eq!(info(&["SIZE"]).size_extension(), Some(None));
        assert_eq!(info(&["SIZE"]).max_message_size(), None);
        assert_eq!(info(&["SIZE 0"]).max_message_size(), None);
        assert_eq!(info(&[]).size_extension(), None);
    }

    #[test]
    fn nothing_advertised() {
        let info = ServerInfo::default();
        assert!(!info.supports_starttls());
        assert!(!info.supports_8bitmime());
        assert!(info.auth_mechanisms().is_none());
    }
}
