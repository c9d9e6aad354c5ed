//! SMTP command builder.

mod data;

use std::fmt;

pub use data::encode_data;

use crate::types::{Address, AuthMechanism};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (SASL-IR), already base64 encoded
        initial_response: Option<String>,
    },
    /// A base64 line answering a 334 challenge
    SaslResponse(String),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// Announce an 8-bit body (`BODY=8BITMIME`)
        eight_bit: bool,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTH ");
                buf.extend_from_slice(mechanism.as_str().as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is sent as "="
                    if resp.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(resp.as_bytes());
                    }
                }
            }
            Self::SaslResponse(line) => buf.extend_from_slice(line.as_bytes()),
            Self::MailFrom {
                from,
                eight_bit,
                size,
            } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.as_str().as_bytes());
                buf.push(b'>');
                if *eight_bit {
                    buf.extend_from_slice(b" BODY=8BITMIME");
                }
                if let Some(size) = size {
                    buf.extend_from_slice(format!(" SIZE={size}").as_bytes());
                }
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::Data => buf.extend_from_slice(b"DATA"),
            Self::Quit => buf.extend_from_slice(b"QUIT"),
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Log form of the command, with credentials masked.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                write!(f, "AUTH {}", mechanism.as_str())?;
                if initial_response.is_some() {
                    f.write_str(" <redacted>")?;
                }
                Ok(())
            }
            Self::SaslResponse(_) => f.write_str("<redacted>"),
            other => {
                let bytes = other.serialize();
                let line = String::from_utf8_lossy(bytes.strip_suffix(b"\r\n").unwrap_or(&bytes));
                f.write_str(&line)
            }
        }
    }
}
