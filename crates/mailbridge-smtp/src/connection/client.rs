//! Type-state SMTP client.

use std::collections::HashSet;
use std::io;
use std::marker::PhantomData;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use super::stream::with_timeout;
use super::{ServerInfo, SmtpStream};
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};

const MAX_LINE: u64 = 4096;
const MAX_REPLY_LINES: usize = 256;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Authenticated {}
}

/// States a mail transaction can start from.
pub trait MailReady: sealed::Sealed {}
impl MailReady for Connected {}
impl MailReady for Authenticated {}

/// SMTP client with type-state pattern.
///
/// `S` is the transport; it defaults to [`SmtpStream`] and is generic so
/// that any `AsyncRead + AsyncWrite` pipe can carry a session.
pub struct Client<State, S = SmtpStream> {
    stream: BufReader<S>,
    server_info: ServerInfo,
    ehlo_name: String,
    io_timeout: Duration,
    _state: PhantomData<State>,
}

impl<State, S> std::fmt::Debug for Client<State, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &std::any::type_name::<State>())
            .field("server_info", &self.server_info)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> Client<Connected, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// `io_timeout` bounds the greeting and every later command round-trip.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails, times out, or the
    /// server refuses the session.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut stream = BufReader::new(stream);
        let greeting = with_timeout(io_timeout, read_reply(&mut stream))
            .await?
            .success()?;

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %hostname, "SMTP greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            ehlo_name: String::new(),
            io_timeout,
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?
            .success()?;

        // First line is the server's greeting, the rest are keywords
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        self.ehlo_name = client_hostname.to_string();
        Ok(self)
    }

    /// Authenticates with PLAIN, or LOGIN when that is the only usable
    /// mechanism the server advertises.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn authenticate(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        let only_login = self
            .server_info
            .auth_mechanisms()
            .is_some_and(|m| m.contains(&AuthMechanism::Login) && !m.contains(&AuthMechanism::Plain));
        if only_login {
            self.auth_login(username, password).await
        } else {
            self.auth_plain(username, password).await
        }
    }

    /// Authenticates using PLAIN with an initial response.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        let token = BASE64.encode(format!("\0{username}\0{password}"));
        self.send_command(Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(token),
        })
        .await?
        .success()?;
        debug!("SMTP authenticated with PLAIN");
        Ok(self.transition())
    }

    /// Authenticates using the LOGIN challenge exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects either step.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        let is_challenge = |code: ReplyCode| code == ReplyCode::AUTH_CONTINUE;
        self.send_command(Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        })
        .await?
        .expect_code(is_challenge)?;
        self.send_command(Command::SaslResponse(BASE64.encode(username)))
            .await?
            .expect_code(is_challenge)?;
        self.send_command(Command::SaslResponse(BASE64.encode(password)))
            .await?
            .success()?;
        debug!("SMTP authenticated with LOGIN");
        Ok(self.transition())
    }
}

impl Client<Connected, SmtpStream> {
    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(mut self, hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        self.send_command(Command::StartTls).await?.success()?;

        let plain = self.stream.into_inner();
        let upgraded = with_timeout(self.io_timeout, plain.upgrade_to_tls(hostname)).await?;
        debug!(host = hostname, "SMTP connection upgraded to TLS");

        // Capabilities from before the upgrade must be discarded
        let client = Self {
            stream: BufReader::new(upgraded),
            server_info: ServerInfo {
                hostname: self.server_info.hostname,
                extensions: HashSet::new(),
            },
            ehlo_name: String::new(),
            io_timeout: self.io_timeout,
            _state: PhantomData,
        };
        client.ehlo(&self.ehlo_name).await
    }
}

impl<State: MailReady, S> Client<State, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a mail transaction.
    ///
    /// `size` is announced with SIZE when the server supports it, and checked
    /// against the advertised limit first. `BODY=8BITMIME` is sent whenever
    /// the server offers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] without contacting the server when
    /// `size` exceeds the limit, or an error if MAIL FROM is refused.
    pub async fn mail_from(
        mut self,
        from: Address,
        size: Option<usize>,
    ) -> Result<Client<MailTransaction, S>> {
        if let (Some(size), Some(limit)) = (size, self.server_info.max_message_size())
            && size > limit
        {
            return Err(Error::MessageTooLarge { size, limit });
        }
        let announce_size = self.server_info.size_extension().is_some();
        let eight_bit = self.server_info.supports_8bitmime();

        self.send_command(Command::MailFrom {
            from,
            eight_bit,
            size: size.filter(|_| announce_size),
        })
        .await?
        .success()?;
        Ok(self.transition())
    }
}

impl<S> Client<MailTransaction, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded, S>> {
        self.send_command(Command::RcptTo { to }).await?.success()?;
        Ok(self.transition())
    }
}

impl<S> Client<RecipientAdded, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.send_command(Command::RcptTo { to }).await?.success()?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers 354.
    pub async fn data(mut self) -> Result<Client<Data, S>> {
        self.send_command(Command::Data)
            .await?
            .expect_code(|code| code == ReplyCode::START_DATA)?;
        Ok(self.transition())
    }
}

impl<S> Client<Data, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends the message content and completes the transaction.
    ///
    /// The message should be RFC 5322 formatted; see [`encode_data`] for the
    /// line ending and dot handling applied on the way out.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or the server rejects it.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Connected, S>> {
        let payload = encode_data(message);
        let stream = &mut self.stream;
        let reply = with_timeout(self.io_timeout, async move {
            stream.get_mut().write_all(&payload).await?;
            stream.get_mut().flush().await?;
            read_reply(stream).await
        })
        .await?
        .success()?;
        debug!(bytes = message.len(), reply = %reply.message_text(), "SMTP message accepted");
        Ok(self.transition())
    }
}

impl<State, S> Client<State, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server information.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        self.send_command(Command::Quit)
            .await?
            .expect_code(|code| code == ReplyCode::CLOSING || code.is_success())?;
        // The server closes its end after 221
        let _ = self.stream.get_mut().shutdown().await;
        Ok(())
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        debug!(command = %cmd, "SMTP >");
        let data = cmd.serialize();
        let stream = &mut self.stream;
        let reply = with_timeout(self.io_timeout, async move {
            stream.get_mut().write_all(&data).await?;
            stream.get_mut().flush().await?;
            read_reply(stream).await
        })
        .await?;
        debug!(code = %reply.code, "SMTP <");
        Ok(reply)
    }

    fn transition<Next>(self) -> Client<Next, S> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            ehlo_name: self.ehlo_name,
            io_timeout: self.io_timeout,
            _state: PhantomData,
        }
    }
}

async fn read_reply<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let mut raw = Vec::new();
        let n = (&mut *reader)
            .take(MAX_LINE)
            .read_until(b'\n', &mut raw)
            .await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        if !raw.ends_with(b"\n") && n as u64 == MAX_LINE {
            return Err(Error::Protocol("Reply line too long".into()));
        }

        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if line.is_empty() {
            continue;
        }

        // Anything shorter than a code plus separator cannot continue
        let is_last = line.len() < 4 || is_last_reply_line(&line);
        lines.push(line);
        if is_last {
            break;
        }
        if lines.len() >= MAX_REPLY_LINES {
            return Err(Error::Protocol("Reply has too many lines".into()));
        }
    }

    parse_reply(&lines)
}
