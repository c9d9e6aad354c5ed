//! # mailbridge-imap
//!
//! A small async IMAP4rev1 client built for one job: open a session, select a
//! folder, search it, and stream full message bodies back as they arrive.
//!
//! ## Features
//!
//! - **Runtime-checked session state**: misuse is an [`Error::InvalidState`],
//!   failures leave the session `Errored` until it is closed
//! - **Streaming FETCH**: each message is handed out as soon as its literal
//!   has been read, so decoding can overlap the transfer
//! - **Timeouts everywhere**: connect, every command round-trip, and every
//!   streamed item
//! - **TLS via rustls**: implicit TLS or STARTTLS, no OpenSSL dependency
//! - **Sans-I/O parser**: protocol parsing separated from network I/O
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailbridge_imap::{
//!     Config, Credentials, FetchOptions, SearchCriteria, Security, Session,
//! };
//!
//! # async fn run() -> mailbridge_imap::Result<()> {
//! let config = Config::builder("imap.example.com")
//!     .security(Security::Implicit)
//!     .build();
//! let credentials = Credentials::new("user@example.com", "password");
//!
//! let mut session = Session::new(config.io_timeout);
//! session.connect(&config, &credentials).await?;
//! session.select_folder("INBOX").await?;
//!
//! let unseen = session.search(&SearchCriteria::Unseen).await?;
//! let mut messages = session.fetch(&unseen, FetchOptions::default()).await?;
//! while let Some(item) = messages.next().await {
//!     let (id, raw) = item?;
//!     println!("message {id}: {} bytes", raw.len());
//! }
//! drop(messages);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command builders and serialization
//! - [`connection`]: transport, framing, client and session
//! - [`parser`]: sans-I/O response parser
//! - [`types`]: tags, sequence numbers, capabilities, response codes

#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, TagGenerator};
pub use connection::{
    Client, Config, ConfigBuilder, Credentials, FetchEvent, FetchOptions, FetchStream,
    FramedStream, ImapStream, Security, Session, SessionState,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{Capability, ResponseCode, SeqNum, SequenceSet, Status, Tag};
