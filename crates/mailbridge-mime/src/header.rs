//! MIME header handling.

use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Collection of email headers. Names are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first raw value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all raw values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gets the first value for a header with RFC 2047 words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true when no header was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Parses a header block.
    ///
    /// Folded lines (starting with space or tab) are unfolded into the
    /// preceding field. Parsing stops at the first empty line.
    ///
    /// # Errors
    ///
    /// Returns an error if the first line is not a `Name: value` field.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                } else {
                    return Err(Error::InvalidHeader(format!(
                        "continuation line before any field: {line:?}"
                    )));
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim());
            }

            match line.split_once(':') {
                Some((name, value)) if is_field_name(name) => {
                    current = Some((name.to_string(), value.trim().to_string()));
                }
                // mbox "From " separator lines are skipped
                _ if index == 0 && line.starts_with("From ") => {}
                _ if index == 0 => {
                    return Err(Error::InvalidHeader(format!(
                        "expected header field, found {line:?}"
                    )));
                }
                _ => {}
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim());
        }

        Ok(headers)
    }
}

/// RFC 5322 field names: printable ASCII except colon, no spaces.
fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}
