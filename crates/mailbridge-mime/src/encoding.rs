//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header words and the handful
//! of charsets seen in practice.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks (`=` at end of line, optionally followed by trailing
/// whitespace) are removed.
///
/// # Errors
///
/// Returns an error if the input contains an invalid escape sequence.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break, tolerating transport padding before the newline
        let mut j = i + 1;
        while j < data.len() && (data[j] == b' ' || data[j] == b'\t') {
            j += 1;
        }
        if data.get(j) == Some(&b'\r') && data.get(j + 1) == Some(&b'\n') {
            i = j + 2;
            continue;
        }
        if data.get(j) == Some(&b'\n') {
            i = j + 1;
            continue;
        }
        if j == data.len() {
            break;
        }

        match (data.get(i + 1), data.get(i + 2)) {
            (Some(&hi), Some(&lo)) => {
                let value = hex_value(hi)
                    .zip(hex_value(lo))
                    .map(|(h, l)| (h << 4) | l)
                    .ok_or_else(|| {
                        Error::InvalidEncoding(format!(
                            "Invalid hex escape: ={}{}",
                            hi as char, lo as char
                        ))
                    })?;
                result.push(value);
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Longest encoded word RFC 2047 allows.
pub const MAX_ENCODED_WORD_LEN: usize = 75;

/// Encodes a header value using RFC 2047 when it is not plain ASCII.
///
/// Format: `=?charset?B?encoded-text?=`. Longer values become several words
/// of at most [`MAX_ENCODED_WORD_LEN`] characters, folded with CRLF and a
/// space. Words never split a character.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) && !text.contains("=?") {
        return text.to_string();
    }

    // "=?" charset "?B?" payload "?="
    let overhead = charset.len() + 7;
    let max_bytes = (MAX_ENCODED_WORD_LEN.saturating_sub(overhead) / 4 * 3).max(4);

    let mut chunks = Vec::new();
    let (mut start, mut end) = (0, 0);
    for (index, c) in text.char_indices() {
        let next = index + c.len_utf8();
        if next - start > max_bytes && end > start {
            chunks.push(&text[start..end]);
            start = end;
        }
        end = next;
    }
    chunks.push(&text[start..end]);

    chunks
        .iter()
        .map(|chunk| format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Decodes a single RFC 2047 encoded word (`=?charset?encoding?text?=`).
///
/// # Errors
///
/// Returns an error if the word is malformed or its payload cannot be decoded.
pub fn decode_encoded_word(word: &str) -> Result<String> {
    let inner = word
        .strip_prefix("=?")
        .and_then(|w| w.strip_suffix("?="))
        .ok_or_else(|| Error::InvalidEncoding(format!("Not an encoded word: {word}")))?;

    let mut parts = inner.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(text)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    };

    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(text.as_bytes())?,
        "Q" => {
            let with_spaces = text.replace('_', " ");
            decode_quoted_printable(with_spaces.as_bytes())?
        }
        other => {
            return Err(Error::InvalidEncoding(format!(
                "Unknown encoding: {other}"
            )));
        }
    };

    Ok(decode_charset(&bytes, Some(charset)))
}

/// Decodes every RFC 2047 encoded word found in a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Words that fail
/// to decode are kept verbatim.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    if !text.contains("=?") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            out.push_str(&pending_space);
            out.push_str(rest);
            return out;
        };

        let (before, candidate) = rest.split_at(start);
        let decoded = find_word_end(candidate).and_then(|end| {
            decode_encoded_word(&candidate[..end])
                .ok()
                .map(|text| (text, end))
        });

        let Some((word, end)) = decoded else {
            // Not a valid word: emit the "=?" literally and move on
            out.push_str(&pending_space);
            pending_space.clear();
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            last_was_word = false;
            continue;
        };

        if last_was_word && before.chars().all(char::is_whitespace) {
            // Separator between adjacent encoded words
        } else {
            out.push_str(&pending_space);
            out.push_str(before);
        }
        pending_space.clear();
        out.push_str(&word);
        last_was_word = true;
        rest = &candidate[end..];

        // Hold trailing whitespace until we know what follows it
        let trimmed = rest.trim_start();
        pending_space.push_str(&rest[..rest.len() - trimmed.len()]);
        rest = trimmed;
    }

    out.push_str(&pending_space);
    out
}

/// Finds the end (exclusive) of an encoded word starting at `s[0..2] == "=?"`.
fn find_word_end(s: &str) -> Option<usize> {
    // =?charset?E?text?=  -> need the two inner '?' then the closing "?="
    let bytes = s.as_bytes();
    let mut question_marks = 0;
    let mut i = 2;
    while i < bytes.len() {
        match bytes[i] {
            b'?' if question_marks == 2 => {
                return (bytes.get(i + 1) == Some(&b'=')).then_some(i + 2);
            }
            b'?' => question_marks += 1,
            b' ' | b'\t' | b'\r' | b'\n' => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Converts bytes in the given charset to a string.
///
/// UTF-8 and US-ASCII are decoded directly, ISO-8859-1 and its aliases are
/// mapped byte for byte, anything else is decoded lossily as UTF-8.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.map(str::to_ascii_lowercase);
    match charset.as_deref() {
        Some("iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" | "windows-1252"
        | "cp1252") => bytes.iter().map(|&b| char::from(b)).collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_decode_with_line_breaks() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(decode_base64(b"not*base64").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!").unwrap(), b"Hello, World!");
        assert_eq!(
            decode_quoted_printable(b"H=C3=A9llo").unwrap(),
            "Héllo".as_bytes()
        );
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=  \nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"trailing=").unwrap(), b"trailing");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable(b"bad =ZZ escape").is_err());
        assert!(decode_quoted_printable(b"cut =A").is_err());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");

        let encoded = encode_rfc2047("Héllo", "utf-8");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
        assert_eq!(decode_rfc2047(&encoded), "Héllo");
    }

    #[test]
    fn test_rfc2047_long_value_is_folded() {
        let text = "é".repeat(600);
        let encoded = encode_rfc2047(&text, "utf-8");
        let words: Vec<_> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.starts_with("=?utf-8?B?") && w.len() <= 75));
        assert_eq!(decode_rfc2047(&encoded), text);
    }

    #[test]
    fn test_rfc2047_decode_single() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_rfc2047("=?UTF-8?q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        let value = "=?utf-8?Q?Caf=C3=A9?= =?utf-8?Q?_au_lait?=";
        assert_eq!(decode_rfc2047(value), "Café au lait");
    }

    #[test]
    fn test_rfc2047_mixed_with_plain_text() {
        let value = "Re: =?iso-8859-1?Q?r=E9sum=E9?= attached";
        assert_eq!(decode_rfc2047(value), "Re: résumé attached");
    }

    #[test]
    fn test_rfc2047_malformed_word_kept() {
        assert_eq!(decode_rfc2047("price =? unknown"), "price =? unknown");
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
    }

    #[test]
    fn test_decode_charset_latin1() {
        assert_eq!(decode_charset(&[0x63, 0x61, 0x66, 0xE9], Some("ISO-8859-1")), "café");
        assert_eq!(decode_charset("café".as_bytes(), Some("utf-8")), "café");
        assert_eq!(decode_charset(b"plain", None), "plain");
    }

    proptest! {
        #[test]
        fn base64_decodes_what_it_encodes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(decode_base64(encode_base64(&data).as_bytes()).unwrap(), data);
        }

        #[test]
        fn rfc2047_decodes_what_it_encodes(text in "\\PC{0,40}") {
            prop_assert_eq!(decode_rfc2047(&encode_rfc2047(&text, "utf-8")), text);
        }

        #[test]
        fn rfc2047_words_stay_within_line_limits(text in "\\PC{0,300}") {
            let encoded = encode_rfc2047(&text, "utf-8");
            for line in encoded.split("\r\n") {
                let word = line.strip_prefix(' ').unwrap_or(line);
                prop_assert!(word.len() <= MAX_ENCODED_WORD_LEN, "{} chars: {}", word.len(), word);
            }
            prop_assert_eq!(decode_rfc2047(&encoded), text);
        }

        #[test]
        fn quoted_printable_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode_quoted_printable(&data);
        }
    }
}
