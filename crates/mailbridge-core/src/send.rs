//! Plain-text email submission.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use mailbridge_mime::address::{Mailbox, parse_address_list, render_address_list};
use mailbridge_mime::encoding::encode_rfc2047;
use mailbridge_smtp::{self as smtp, Address, Envelope};
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::{MailError, Result};

const MISSING_PARAMETERS: &str = "Missing required parameters: to, subject, text";

/// Hands a finished message to the outside world.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Delivers `message` to every recipient of `envelope`.
    async fn deliver(&self, envelope: &Envelope, message: &[u8]) -> smtp::Result<()>;
}

/// Submits through the configured SMTP server.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    config: Arc<SmtpConfig>,
}

impl SmtpTransport {
    /// Creates a transport for `config`.
    #[must_use]
    pub const fn new(config: Arc<SmtpConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, envelope: &Envelope, message: &[u8]) -> smtp::Result<()> {
        smtp::send(
            &self.config.server,
            Some(&self.config.credentials),
            envelope,
            message,
        )
        .await
    }
}

/// Arguments of one send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    /// One or more comma-separated recipients.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// Carbon-copy recipients. An empty list counts as absent.
    pub cc: Option<Vec<String>>,
}

/// Builds messages and submits them through a [`MailTransport`].
#[derive(Debug, Clone)]
pub struct Sender<T> {
    transport: T,
    from: String,
}

impl<T: MailTransport> Sender<T> {
    /// Creates a sender whose messages come from `from`.
    #[must_use]
    pub fn new(transport: T, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
        }
    }

    /// Sends a plain text message and returns a confirmation line.
    ///
    /// # Errors
    ///
    /// [`MailError::Validation`] for missing fields or unusable recipient
    /// addresses; nothing is sent then. [`MailError::Send`] when building
    /// the envelope or submitting fails.
    pub async fn send_email(&self, request: &SendRequest) -> Result<String> {
        let to = request.to.trim();
        let subject = request.subject.trim();
        if to.is_empty() || subject.is_empty() || request.text.trim().is_empty() {
            return Err(MailError::Validation(MISSING_PARAMETERS.to_string()));
        }

        let to = recipient_mailboxes(to)?;
        let mut cc = Vec::new();
        for entry in request.cc.iter().flatten().map(|c| c.trim()) {
            if !entry.is_empty() {
                cc.extend(recipient_mailboxes(entry)?);
            }
        }

        let recipients = to
            .iter()
            .chain(&cc)
            .map(|mb| {
                Address::new(&mb.address)
                    .map_err(|_| MailError::Validation(format!("Invalid email address: {}", mb.address)))
            })
            .collect::<Result<Vec<_>>>()?;

        let from = parse_address_list(&self.from)
            .into_iter()
            .next()
            .filter(|_| !self.from.chars().any(char::is_control))
            .ok_or_else(|| MailError::Send(format!("Invalid sender address: {}", self.from.escape_debug())))?;
        let sender = Address::new(&from.address).map_err(|e| MailError::Send(e.to_string()))?;
        let envelope =
            Envelope::new(sender.clone(), recipients).map_err(|e| MailError::Send(e.to_string()))?;

        let message = OutgoingMessage {
            from: &from,
            to: &to,
            cc: &cc,
            subject,
            body: &request.text,
            message_id: message_id(sender.as_str()),
        };

        if let Err(e) = self
            .transport
            .deliver(&envelope, message.to_rfc5322().as_bytes())
            .await
        {
            warn!(error = %e, "submission failed");
            return Err(MailError::Send(e.to_string()));
        }

        info!(recipients = envelope.recipients().len(), "email sent");
        let mut confirmation = format!("Email sent successfully to {}", render_address_list(&to));
        if !cc.is_empty() {
            confirmation.push_str(" with CC to ");
            confirmation.push_str(&render_address_list(&cc));
        }
        Ok(confirmation)
    }
}

/// Parses a recipient field. Any control character makes it invalid.
fn recipient_mailboxes(value: &str) -> Result<Vec<Mailbox>> {
    let mailboxes = if value.chars().any(char::is_control) {
        Vec::new()
    } else {
        parse_address_list(value)
    };
    if mailboxes.is_empty() {
        return Err(MailError::Validation(format!(
            "Invalid email address: {}",
            value.escape_debug()
        )));
    }
    Ok(mailboxes)
}

/// One mailbox as header text: specials quoted, non-ASCII names encoded.
fn header_mailbox(mailbox: &Mailbox) -> String {
    let Some(name) = mailbox.name.as_deref().filter(|n| !n.is_empty()) else {
        return mailbox.address.clone();
    };
    let name = if !name.is_ascii() {
        encode_rfc2047(name, "utf-8")
    } else if name.chars().any(|c| "()<>[]:;@\\,.\"".contains(c)) {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        name.to_string()
    };
    format!("{name} <{}>", mailbox.address)
}

fn header_list(mailboxes: &[Mailbox]) -> String {
    mailboxes.iter().map(header_mailbox).collect::<Vec<_>>().join(", ")
}

fn message_id(sender: &str) -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let domain = sender.rsplit_once('@').map_or("localhost", |(_, d)| d);
    let now = Utc::now();
    format!(
        "<{}.{}.{}@{domain}>",
        now.timestamp(),
        now.timestamp_subsec_micros(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

struct OutgoingMessage<'a> {
    from: &'a Mailbox,
    to: &'a [Mailbox],
    cc: &'a [Mailbox],
    subject: &'a str,
    body: &'a str,
    message_id: String,
}

impl OutgoingMessage<'_> {
    fn to_rfc5322(&self) -> String {
        use std::fmt::Write;

        let mut message = String::new();

        let _ = write!(message, "From: {}\r\n", header_mailbox(self.from));
        let _ = write!(message, "To: {}\r\n", header_list(self.to));
        if !self.cc.is_empty() {
            let _ = write!(message, "Cc: {}\r\n", header_list(self.cc));
        }
        let _ = write!(message, "Subject: {}\r\n", encode_rfc2047(self.subject, "utf-8"));
        let _ = write!(message, "Date: {}\r\n", Utc::now().to_rfc2822());
        let _ = write!(message, "Message-ID: {}\r\n", self.message_id);
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");
        message.push_str("\r\n");
        message.push_str(self.body);

        message
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use mailbridge_mime::Message;
    use mailbridge_mime::encoding::MAX_ENCODED_WORD_LEN;

    use super::*;

    /// Records every delivery; fails with the given reply when set.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Envelope, Vec<u8>)>>,
        reject: Option<(u16, &'static str)>,
    }

    impl RecordingTransport {
        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<'a> MailTransport for &'a RecordingTransport {
        async fn deliver(&self, envelope: &Envelope, message: &[u8]) -> smtp::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((envelope.clone(), message.to_vec()));
            match self.reject {
                Some((code, text)) => Err(smtp::Error::SmtpError {
                    code,
                    message: text.to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    fn request(to: &str, subject: &str, text: &str) -> SendRequest {
        SendRequest {
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
            cc: None,
        }
    }

    #[tokio::test]
    async fn sends_and_confirms() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");

        let confirmation = sender.send_email(&request("u@v.com", "S", "T")).await.unwrap();
        assert_eq!(confirmation, "Email sent successfully to u@v.com");

        let sent = transport.sent.lock().unwrap();
        let (envelope, raw) = &sent[0];
        assert_eq!(envelope.sender().as_str(), "me@example.com");
        assert_eq!(envelope.recipients()[0].as_str(), "u@v.com");

        let parsed = Message::parse(raw).unwrap();
        assert_eq!(parsed.header("to"), Some("u@v.com"));
        assert_eq!(parsed.subject().as_deref(), Some("S"));
        assert!(parsed.message_id().unwrap().ends_with("@example.com>"));
        assert!(parsed.date().is_some());
        assert_eq!(parsed.text_body().unwrap().as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn missing_fields_never_reach_the_transport() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");

        for req in [
            request("u@v.com", "", "T"),
            request("", "S", "T"),
            request("u@v.com", "S", "  "),
        ] {
            let err = sender.send_email(&req).await.unwrap_err();
            assert_eq!(err, MailError::Validation(MISSING_PARAMETERS.into()));
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn cc_goes_to_headers_envelope_and_confirmation() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "Bridge <me@example.com>");
        let mut req = request("a@x.com, b@y.com", "S", "T");
        req.cc = Some(vec!["c@z.com".into(), "Dee <d@z.com>".into()]);

        let confirmation = sender.send_email(&req).await.unwrap();
        assert_eq!(
            confirmation,
            "Email sent successfully to a@x.com, b@y.com with CC to c@z.com, Dee <d@z.com>"
        );

        let sent = transport.sent.lock().unwrap();
        let (envelope, raw) = &sent[0];
        let rcpts: Vec<_> = envelope.recipients().iter().map(Address::as_str).collect();
        assert_eq!(rcpts, ["a@x.com", "b@y.com", "c@z.com", "d@z.com"]);
        assert_eq!(envelope.sender().as_str(), "me@example.com");

        let parsed = Message::parse(raw).unwrap();
        assert_eq!(parsed.header("cc"), Some("c@z.com, Dee <d@z.com>"));
        assert_eq!(parsed.header("from"), Some("Bridge <me@example.com>"));
    }

    #[tokio::test]
    async fn empty_cc_is_absent() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");
        let mut req = request("u@v.com", "S", "T");
        req.cc = Some(Vec::new());

        let confirmation = sender.send_email(&req).await.unwrap();
        assert_eq!(confirmation, "Email sent successfully to u@v.com");

        let sent = transport.sent.lock().unwrap();
        assert!(Message::parse(&sent[0].1).unwrap().header("cc").is_none());
    }

    #[tokio::test]
    async fn non_ascii_subject_is_encoded() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");

        sender
            .send_email(&request("u@v.com", "Grüße", "Hallo"))
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        let raw = String::from_utf8(sent[0].1.clone()).unwrap();
        assert!(raw.contains("Subject: =?utf-8?B?"));
        assert_eq!(Message::parse(raw.as_bytes()).unwrap().subject().as_deref(), Some("Grüße"));
    }

    #[tokio::test]
    async fn bad_recipient_is_a_validation_error() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");

        let err = sender
            .send_email(&request("not an address", "S", "T"))
            .await
            .unwrap_err();
        assert!(err.is_client_error(), "{err:?}");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn line_breaks_in_recipients_are_rejected() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");

        let err = sender
            .send_email(&request("u@v.com\r\nBcc: spy@evil.com", "S", "T"))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Validation(ref m) if m.starts_with("Invalid email address")), "{err:?}");

        let mut req = request("u@v.com", "S", "T");
        req.cc = Some(vec!["c@z.com\nX-Injected: yes".into()]);
        assert!(sender.send_email(&req).await.unwrap_err().is_client_error());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn headers_are_written_from_parsed_addresses() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");
        let req = request("  \"Doe, Jane\" <jane@example.com> ,bob@example.com", "S", "T");

        let confirmation = sender.send_email(&req).await.unwrap();
        assert_eq!(
            confirmation,
            "Email sent successfully to Doe, Jane <jane@example.com>, bob@example.com"
        );

        let sent = transport.sent.lock().unwrap();
        let (envelope, raw) = &sent[0];
        let rcpts: Vec<_> = envelope.recipients().iter().map(Address::as_str).collect();
        assert_eq!(rcpts, ["jane@example.com", "bob@example.com"]);

        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("To: \"Doe, Jane\" <jane@example.com>, bob@example.com\r\n"), "{text}");
        let parsed = Message::parse(raw).unwrap();
        let to = parse_address_list(parsed.header("to").unwrap());
        assert_eq!(to.len(), 2);
        assert_eq!(to[0].name.as_deref(), Some("Doe, Jane"));
    }

    #[tokio::test]
    async fn long_subject_keeps_lines_short() {
        let transport = RecordingTransport::default();
        let sender = Sender::new(&transport, "me@example.com");
        let subject = "é".repeat(600);

        sender
            .send_email(&request("u@v.com", &subject, "T"))
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        let raw = String::from_utf8(sent[0].1.clone()).unwrap();
        let longest = raw.split("\r\n").map(str::len).max().unwrap();
        assert!(
            longest <= "Subject: ".len() + MAX_ENCODED_WORD_LEN,
            "longest line is {longest} octets"
        );
        assert_eq!(Message::parse(raw.as_bytes()).unwrap().subject().as_deref(), Some(subject.as_str()));
    }

    #[tokio::test]
    async fn transport_failure_keeps_its_message() {
        let transport = RecordingTransport {
            reject: Some((550, "5.1.1 User unknown")),
            ..RecordingTransport::default()
        };
        let sender = Sender::new(&transport, "me@example.com");

        let err = sender.send_email(&request("u@v.com", "S", "T")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to send email: SMTP error 550: 5.1.1 User unknown"
        );
    }
}
