//! Core IMAP types.
//!
//! The subset of RFC 3501 types the retrieval session needs.

mod capability;
mod identifiers;
mod response_code;
mod sequence;

pub use capability::{Capability, Status};
pub use identifiers::{SeqNum, Tag};
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;
