//! IMAP protocol parser.
//!
//! A sans-I/O parser for IMAP server responses, split into a lexer that turns
//! bytes into tokens and a response parser that builds structured responses
//! from them.
//!
//! # Example
//!
//! ```
//! use mailbridge_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* SEARCH 4 9\r\n").unwrap();
//!
//! match response {
//!     Response::Untagged(UntaggedResponse::Search(ids)) => assert_eq!(ids.len(), 2),
//!     _ => panic!("Expected SEARCH"),
//! }
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, UntaggedResponse};
