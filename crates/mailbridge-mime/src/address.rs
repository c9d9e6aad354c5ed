//! Address list parsing (RFC 5322 section 3.4).
//!
//! Parsing is lenient: anything that does not look like a mailbox is skipped
//! rather than reported, since address headers in the wild are frequently
//! malformed.

use crate::encoding::decode_rfc2047;
use std::fmt;

/// A single mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name with RFC 2047 words decoded.
    pub name: Option<String>,
    /// The `local@domain` address.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox without a display name.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Creates a mailbox with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => write!(f, "{name} <{}>", self.address),
            _ => f.write_str(&self.address),
        }
    }
}

/// Parses an address list header value. Groups are flattened.
#[must_use]
pub fn parse_address_list(value: &str) -> Vec<Mailbox> {
    split_entries(value)
        .iter()
        .filter_map(|entry| parse_mailbox(entry))
        .collect()
}

/// Renders mailboxes as `Name <addr>` or `addr`, joined with `", "`.
#[must_use]
pub fn render_address_list(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Splits on top-level `,`, treating `group:` prefixes and `;` terminators as
/// separators too.
fn split_entries(value: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut comment_depth = 0usize;
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes || comment_depth > 0 => {
                current.push(ch);
                escaped = true;
            }
            '"' if comment_depth == 0 => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '(' if !in_quotes => {
                comment_depth += 1;
                current.push(ch);
            }
            ')' if !in_quotes && comment_depth > 0 => {
                comment_depth -= 1;
                current.push(ch);
            }
            '<' if !in_quotes && comment_depth == 0 => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes && comment_depth == 0 => {
                in_angle = false;
                current.push(ch);
            }
            ',' | ';' if !in_quotes && !in_angle && comment_depth == 0 => {
                entries.push(std::mem::take(&mut current));
            }
            // Group name: drop it, keep the members
            ':' if !in_quotes && !in_angle && comment_depth == 0 => current.clear(),
            _ => current.push(ch),
        }
    }
    entries.push(current);
    entries
}

fn parse_mailbox(entry: &str) -> Option<Mailbox> {
    let mut display = String::new();
    let mut angle = None::<String>;
    let mut angle_closed = false;
    let mut comment = String::new();
    let mut in_quotes = false;
    let mut comment_depth = 0usize;
    let mut escaped = false;

    for ch in entry.chars() {
        if escaped {
            if comment_depth > 0 {
                comment.push(ch);
            } else {
                display.push(ch);
            }
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes || comment_depth > 0 => escaped = true,
            '"' if comment_depth == 0 => in_quotes = !in_quotes,
            '(' if !in_quotes => {
                if comment_depth > 0 {
                    comment.push(ch);
                }
                comment_depth += 1;
            }
            ')' if !in_quotes && comment_depth > 0 => {
                comment_depth -= 1;
                if comment_depth > 0 {
                    comment.push(ch);
                }
            }
            _ if comment_depth > 0 => comment.push(ch),
            '<' if !in_quotes && angle.is_none() => angle = Some(String::new()),
            '>' if !in_quotes => angle_closed = true,
            _ => match angle.as_mut() {
                Some(addr) if !in_quotes && !angle_closed => addr.push(ch),
                _ => display.push(ch),
            },
        }
    }

    let display = collapse_whitespace(&display);
    let comment = collapse_whitespace(&comment);

    match angle {
        Some(addr) => {
            let address = addr.trim().to_string();
            if address.is_empty() {
                return None;
            }
            let name = if display.is_empty() { comment } else { display };
            Some(Mailbox {
                name: non_empty(decode_rfc2047(&name)),
                address,
            })
        }
        None => {
            if display.is_empty() {
                return None;
            }
            Some(Mailbox {
                name: non_empty(decode_rfc2047(&comment)),
                address: display,
            })
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
