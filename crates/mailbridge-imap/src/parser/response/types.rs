//! Response data types.

use crate::types::{Capability, ResponseCode, SeqNum};

/// FETCH response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// Message flags, as raw atoms (`\Seen`, `$Junk`, ...).
    Flags(Vec<String>),
    /// RFC822 size.
    Rfc822Size(u32),
    /// UID.
    Uid(u32),
    /// BODY section.
    Body {
        /// Section specifier; `None` for the whole message (`BODY[]`).
        section: Option<String>,
        /// Body data; `None` when the server answered NIL.
        data: Option<Vec<u8>>,
    },
    /// Any item this parser does not model, by name.
    Other(String),
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// OK status.
    Ok {
        /// Response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO status.
    No {
        /// Response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD status.
    Bad {
        /// Response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH greeting.
    PreAuth {
        /// Response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE: the server is closing the connection.
    Bye {
        /// Response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY data.
    Capability(Vec<Capability>),
    /// SEARCH results.
    Search(Vec<SeqNum>),
    /// Number of messages in the selected mailbox.
    Exists(u32),
    /// A message was expunged.
    Expunge(SeqNum),
    /// FETCH data for one message.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Returned data items.
        items: Vec<FetchItem>,
    },
    /// Anything else (FLAGS, RECENT, LIST, ...), by keyword.
    Other(String),
}

impl UntaggedResponse {
    /// Takes the full message body out of a FETCH response, if it carries
    /// one. Partial sections and NIL bodies do not count.
    #[must_use]
    pub fn into_fetched_body(self) -> Option<(SeqNum, Vec<u8>)> {
        let Self::Fetch { seq, items } = self else {
            return None;
        };
        items.into_iter().find_map(|item| match item {
            FetchItem::Body {
                section: None,
                data: Some(data),
            } => Some((seq, data)),
            _ => None,
        })
    }
}
