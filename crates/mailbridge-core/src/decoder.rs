//! Raw message bytes to [`EmailRecord`].

use chrono::{DateTime, SecondsFormat, Utc};
use mailbridge_mime::Message;
use mailbridge_mime::address::{parse_address_list, render_address_list};
use serde::{Deserialize, Serialize};

/// A message could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct DecodeError(#[from] mailbridge_mime::Error);

/// Normalized view of one message. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    /// `Message-ID` as sent.
    pub message_id: String,
    /// Decoded subject.
    pub subject: String,
    /// `YYYY-MM-DDTHH:MM:SS.mmmZ`, or empty when the date is missing or
    /// unparseable.
    pub date: String,
    /// Rendered `From` list.
    pub from: String,
    /// Rendered `To` list.
    pub to: String,
    /// Rendered `Cc` list.
    pub cc: String,
    /// Rendered `Bcc` list.
    pub bcc: String,
    /// Rendered `Reply-To` list.
    pub reply_to: String,
    /// `In-Reply-To` as sent.
    pub in_reply_to: String,
    /// `high`, `normal`, `low` or empty.
    pub priority: String,
    /// Plain text body, or the HTML body rendered as text.
    pub body: String,
}

/// Decodes one complete message.
///
/// # Errors
///
/// Returns an error for empty input, a missing header block, a multipart
/// body without boundary, or an undecodable transfer encoding.
pub fn decode(raw: &[u8]) -> Result<EmailRecord, DecodeError> {
    let message = Message::parse(raw)?;
    let body = message.readable_body()?;

    Ok(EmailRecord {
        message_id: trimmed(message.message_id()),
        subject: message.subject().map(|s| s.trim().to_string()).unwrap_or_default(),
        date: message.date().and_then(normalize_date).unwrap_or_default(),
        from: addresses(&message, "from"),
        to: addresses(&message, "to"),
        cc: addresses(&message, "cc"),
        bcc: addresses(&message, "bcc"),
        reply_to: addresses(&message, "reply-to"),
        in_reply_to: trimmed(message.header("in-reply-to")),
        priority: priority(&message).unwrap_or_default().to_string(),
        body,
    })
}

fn trimmed(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// All occurrences of an address header, rendered as one list.
fn addresses(message: &Message, name: &str) -> String {
    let mailboxes: Vec<_> = message
        .headers()
        .get_all(name)
        .into_iter()
        .flat_map(parse_address_list)
        .collect();
    render_address_list(&mailboxes)
}

/// Parses an RFC 2822 date and renders it in UTC with milliseconds.
fn normalize_date(value: &str) -> Option<String> {
    let mut value = value.trim();
    // Trailing zone comment such as "(CEST)"
    if value.ends_with(')')
        && let Some(open) = value.rfind('(')
    {
        value = value[..open].trim_end();
    }
    let parsed = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

fn priority(message: &Message) -> Option<&'static str> {
    if let Some(level) = message
        .header("x-priority")
        .and_then(|v| v.trim().chars().next())
        .and_then(|c| c.to_digit(10))
    {
        return match level {
            1 | 2 => Some("high"),
            3 => Some("normal"),
            4 | 5 => Some("low"),
            _ => None,
        };
    }

    ["importance", "x-msmail-priority"]
        .iter()
        .filter_map(|name| message.header(name))
        .find_map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some("high"),
            "normal" => Some("normal"),
            "low" => Some("low"),
            _ => None,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SIMPLE: &[u8] = b"Message-ID: <abc@example.com>\r\n\
From: \"Doe, Jane\" <jane@example.com>\r\n\
To: a@x.com, b@y.com\r\n\
Subject: =?UTF-8?B?SMOpbGxv?= world\r\n\
Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\
In-Reply-To:  <parent@example.com> \r\n\
X-Priority: 1 (Highest)\r\n\
\r\n\
Plain body\r\n";

    #[test]
    fn decodes_headers_and_body() {
        let record = decode(SIMPLE).unwrap();
        assert_eq!(record.message_id, "<abc@example.com>");
        assert_eq!(record.from, "Doe, Jane <jane@example.com>");
        assert_eq!(record.to, "a@x.com, b@y.com");
        assert_eq!(record.subject, "Héllo world");
        assert_eq!(record.date, "2003-07-01T08:52:37.000Z");
        assert_eq!(record.in_reply_to, "<parent@example.com>");
        assert_eq!(record.priority, "high");
        assert_eq!(record.body, "Plain body\r\n");
        assert_eq!(record.cc, "");
        assert_eq!(record.reply_to, "");
    }

    #[test]
    fn date_with_trailing_comment() {
        assert_eq!(
            normalize_date(" Tue, 1 Jul 2003 10:52:37 +0200 (CEST) ").as_deref(),
            Some("2003-07-01T08:52:37.000Z")
        );
        assert_eq!(normalize_date("yesterday-ish"), None);
    }

    #[test]
    fn unparseable_date_is_empty() {
        let record = decode(b"Date: not a date\r\nSubject: x\r\n\r\nbody").unwrap();
        assert_eq!(record.date, "");
    }

    #[test]
    fn priority_fallbacks() {
        let low = decode(b"X-Priority: 5\r\n\r\nx").unwrap();
        assert_eq!(low.priority, "low");

        let importance = decode(b"Importance: High\r\n\r\nx").unwrap();
        assert_eq!(importance.priority, "high");

        let ms = decode(b"X-MSMail-Priority: Normal\r\n\r\nx").unwrap();
        assert_eq!(ms.priority, "normal");

        let none = decode(b"Subject: x\r\n\r\nx").unwrap();
        assert_eq!(none.priority, "");
    }

    #[test]
    fn html_only_body_is_rendered_as_text() {
        let raw = b"Content-Type: text/html; charset=utf-8\r\n\r\n<p>Hello <b>there</b></p>";
        let record = decode(raw).unwrap();
        assert!(record.body.contains("Hello"));
        assert!(!record.body.contains("<p>"));
    }

    #[test]
    fn multipart_prefers_plain_text() {
        let raw = b"Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html</p>\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=C3=A9\r\n\
--b1--\r\n";
        let record = decode(raw).unwrap();
        assert!(record.body.starts_with("café"));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(decode(b"").is_err());
        assert!(decode(b"\r\nbody without headers").is_err());
        assert!(decode(b"Content-Type: multipart/mixed\r\n\r\n--x\r\n").is_err());
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(decode(SIMPLE).unwrap()).unwrap();
        assert_eq!(json["messageId"], "<abc@example.com>");
        assert_eq!(json["inReplyTo"], "<parent@example.com>");
        assert_eq!(json["replyTo"], "");
    }

    proptest! {
        #[test]
        fn importance_ignores_case(value in "(?i)high|normal|low") {
            let raw = format!("Importance: {value}\r\n\r\nx");
            prop_assert_eq!(decode(raw.as_bytes()).unwrap().priority, value.to_ascii_lowercase());
        }

        #[test]
        fn x_priority_levels(level in 1u32..=5) {
            let raw = format!("X-Priority: {level}\r\n\r\nx");
            let expected = match level {
                1 | 2 => "high",
                3 => "normal",
                _ => "low",
            };
            prop_assert_eq!(decode(raw.as_bytes()).unwrap().priority, expected);
        }
    }
}
