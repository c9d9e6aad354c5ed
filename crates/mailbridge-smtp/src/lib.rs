//! # mailbridge-smtp
//!
//! A small async SMTP submission client (RFC 5321).
//!
//! ## Features
//!
//! - **Type-state connection management**: compile-time enforcement of valid
//!   SMTP state transitions
//! - **Submission flow**: EHLO, STARTTLS, AUTH PLAIN / LOGIN, MAIL FROM,
//!   RCPT TO, DATA, QUIT
//! - **TLS via rustls**: implicit TLS (port 465) or STARTTLS (port 587)
//! - **Bounded I/O**: connect timeout plus a timeout on every command
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailbridge_smtp::{Address, Config, Credentials, Envelope, Security, send};
//!
//! # async fn run() -> mailbridge_smtp::Result<()> {
//! let config = Config::builder("smtp.example.com")
//!     .security(Security::StartTls)
//!     .build();
//! let credentials = Credentials::new("user@example.com", "password");
//! let envelope = Envelope::new(
//!     Address::new("user@example.com")?,
//!     [Address::new("friend@example.org")?],
//! )?;
//!
//! send(&config, Some(&credentials), &envelope, b"Subject: Hi\r\n\r\nHello!\r\n").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── authenticate() ──→ Authenticated
//!     │                                │
//!     └──────────── mail_from() ───────┘
//!                       │
//!                       ▼
//!               MailTransaction ── rcpt_to() ──→ RecipientAdded ── data() ──→ Data
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command builders and DATA encoding
//! - [`connection`]: transport, type-state client and one-shot submission
//! - [`parser`]: reply parser
//! - [`types`]: addresses, envelopes, extensions, replies

#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, Connected, Credentials, Data, MailReady,
    MailTransaction, RecipientAdded, Security, ServerInfo, SmtpStream, deliver, send,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyCode};
