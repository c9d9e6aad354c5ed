//! IMAP command builder.
//!
//! This module provides types and serialization for the commands the
//! retrieval session issues.

mod serialize;
mod tag_generator;

use crate::types::SequenceSet;

pub use tag_generator::TagGenerator;

use serialize::{write_astring, write_fetch_attributes, write_search_criteria};

/// Search criteria for the SEARCH command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages in the mailbox.
    All,
    /// Messages without the `\Seen` flag.
    Unseen,
    /// Messages with the `\Seen` flag.
    Seen,
    /// Messages whose From header contains the string.
    From(String),
    /// Messages whose Subject header contains the string.
    Subject(String),
    /// All of the nested criteria must match.
    And(Vec<Self>),
}

/// A single FETCH data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAttribute {
    /// The full message (`BODY[]`). With `peek` set, `BODY.PEEK[]` leaves
    /// `\Seen` untouched.
    FullBody {
        /// Use `BODY.PEEK[]` instead of `BODY[]`.
        peek: bool,
    },
    /// Message flags.
    Flags,
    /// Message size in octets.
    Rfc822Size,
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// SEARCH command.
    Search {
        /// What to match.
        criteria: SearchCriteria,
    },
    /// FETCH command.
    Fetch {
        /// Messages to fetch.
        sequence: SequenceSet,
        /// Data items to return for each message.
        items: Vec<FetchAttribute>,
    },
}

impl Command {
    /// Serializes the command with the given tag, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }
            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }
            Self::Fetch { sequence, items } => {
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_attributes(&mut buf, items);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Command name for logging. Never includes arguments, so credentials
    /// cannot leak into traces.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
        }
    }
}
