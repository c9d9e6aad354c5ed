//! MIME message structure and handling.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;

/// Nesting limit for multipart bodies. Deeper parts are kept as opaque leaves.
const MAX_DEPTH: usize = 32;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// One MIME entity: headers, raw body, and child parts for multipart bodies.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, still transfer-encoded).
    pub body: Vec<u8>,
    /// Child parts (empty unless multipart).
    pub parts: Vec<Part>,
}

impl Part {
    /// Gets the content type, falling back to `text/plain` when absent or
    /// unparseable.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::default_text)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// True for parts marked `Content-Disposition: attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers.get("content-disposition").is_some_and(|d| {
            d.split(';')
                .next()
                .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("attachment"))
        })
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&self.body),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(&self.body),
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as a string using the part's charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        Ok(decode_charset(&decoded, self.content_type().charset()))
    }

    /// Depth-first search for the first inline leaf of the given type.
    #[must_use]
    pub fn find_leaf(&self, main_type: &str, sub_type: &str) -> Option<&Self> {
        if self.parts.is_empty() {
            let matches = self.content_type().is(main_type, sub_type) && !self.is_attachment();
            return matches.then_some(self);
        }
        self.parts
            .iter()
            .find_map(|part| part.find_leaf(main_type, sub_type))
    }

    fn parse(raw: &[u8], depth: usize) -> Result<Self> {
        let (head, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head))?;

        let mut part = Self {
            headers,
            body: body.to_vec(),
            parts: Vec::new(),
        };

        let content_type = part.content_type();
        if content_type.is_multipart() && depth < MAX_DEPTH {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            part.parts = split_multipart(body, boundary)
                .into_iter()
                .map(|child| Self::parse(child, depth + 1))
                .collect::<Result<_>>()?;
        }

        Ok(part)
    }
}

/// A parsed email message.
#[derive(Debug, Clone)]
pub struct Message {
    /// The top-level entity.
    pub root: Part,
}

impl Message {
    /// Parses a complete RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, the header block is malformed,
    /// or a multipart body lacks its boundary parameter.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Empty);
        }
        if raw.starts_with(b"\r\n") || raw.starts_with(b"\n") {
            return Err(Error::InvalidHeader("message has no header block".to_string()));
        }

        Ok(Self {
            root: Part::parse(raw, 0)?,
        })
    }

    /// Top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Raw first value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.root.headers.get(name)
    }

    /// Gets the Subject header with encoded words decoded.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.root.headers.get_decoded("subject")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header("message-id")
    }

    /// Gets the Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.header("date")
    }

    /// Decoded text of the first inline `text/plain` part.
    ///
    /// # Errors
    ///
    /// Returns an error if the part's transfer encoding cannot be decoded.
    pub fn text_body(&self) -> Result<Option<String>> {
        self.root
            .find_leaf("text", "plain")
            .map(Part::body_text)
            .transpose()
    }

    /// Decoded markup of the first inline `text/html` part.
    ///
    /// # Errors
    ///
    /// Returns an error if the part's transfer encoding cannot be decoded.
    pub fn html_body(&self) -> Result<Option<String>> {
        self.root
            .find_leaf("text", "html")
            .map(Part::body_text)
            .transpose()
    }

    /// Best readable body: plain text, else HTML rendered as text, else empty.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding the chosen part fails.
    pub fn readable_body(&self) -> Result<String> {
        if let Some(text) = self.text_body()? {
            return Ok(text);
        }
        match self.html_body()? {
            Some(html) => htmd::convert(&html).map_err(|e| Error::Html(e.to_string())),
            None => Ok(String::new()),
        }
    }
}

/// Splits an entity at the first empty line.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(rest) = raw.strip_prefix(b"\r\n") {
        return (&[], rest);
    }
    if let Some(rest) = raw.strip_prefix(b"\n") {
        return (&[], rest);
    }

    let crlf = find(raw, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find(raw, b"\n\n").map(|i| (i, i + 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    split.map_or((raw, &[][..]), |(head_end, body_start)| {
        (&raw[..head_end], &raw[body_start..])
    })
}

/// Returns the byte ranges between `--boundary` delimiter lines.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = find(&body[pos..], b"\n").map_or(body.len(), |i| pos + i + 1);
        let line = trim_line_end(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(s) = start {
                    parts.push(&body[s..strip_newline_before(body, s, pos)]);
                }
                if closing {
                    return parts;
                }
                start = Some(line_end);
            }
        }

        pos = line_end;
    }

    // Unterminated multipart: keep what we have
    if let Some(s) = start {
        parts.push(&body[s..]);
    }
    parts
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// The CRLF before a delimiter belongs to the delimiter, not the part.
fn strip_newline_before(body: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
