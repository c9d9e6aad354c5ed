//! IMAP connection management.
//!
//! - Configuration (host, port, security mode, timeouts)
//! - TLS/plaintext stream abstraction
//! - Framed I/O for the IMAP protocol
//! - A command-level client and the stateful [`Session`] built on it

mod client;
mod config;
mod framed;
mod session;
mod stream;

pub use client::{Client, FetchEvent};
pub use config::{
    Config, ConfigBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, Security,
};
pub use framed::FramedStream;
pub use session::{Credentials, FetchOptions, FetchStream, Session, SessionState};
pub use stream::{ImapStream, connect, create_tls_connector};
