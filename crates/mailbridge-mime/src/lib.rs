//! # mailbridge-mime
//!
//! MIME message parsing for email retrieval.
//!
//! ## Features
//!
//! - **Message parsing**: Parse raw RFC 5322 messages into a tree of parts
//! - **Encoding/Decoding**: Base64, Quoted-Printable, RFC 2047 header words
//! - **Content types**: `type/subtype` with parameters
//! - **Addresses**: Address lists with display names and groups
//!
//! ## Quick Start
//!
//! ```
//! use mailbridge_mime::Message;
//!
//! let raw = b"From: Alice <alice@example.com>\r\n\
//!             Subject: =?utf-8?B?SMOpbGxv?=\r\n\
//!             \r\n\
//!             Hello, World!\r\n";
//!
//! let message = Message::parse(raw).unwrap();
//! assert_eq!(message.subject().as_deref(), Some("Héllo"));
//! assert_eq!(message.text_body().unwrap().as_deref(), Some("Hello, World!\r\n"));
//! ```
//!
//! ### Address lists
//!
//! ```
//! use mailbridge_mime::address::{parse_address_list, render_address_list};
//!
//! let list = parse_address_list("\"Doe, Jane\" <jane@example.com>, bob@example.com");
//! assert_eq!(render_address_list(&list), "Doe, Jane <jane@example.com>, bob@example.com");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;

pub mod address;
pub mod encoding;

pub use address::Mailbox;
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
