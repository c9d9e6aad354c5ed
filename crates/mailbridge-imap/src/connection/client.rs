//! Command-level IMAP client.
//!
//! [`Client`] owns the framed connection and the tag counter, sends one
//! command at a time and collects the untagged data that precedes its tagged
//! completion. Which commands are legal when is tracked one level up, by
//! [`Session`](super::Session).

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::framed::FramedStream;
use super::stream::ImapStream;
use crate::command::{Command, FetchAttribute, SearchCriteria, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, SeqNum, SequenceSet, Status};
use crate::{Error, Result};

/// One step of a streamed FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// A complete message body.
    Message(SeqNum, Vec<u8>),
    /// Untagged data that carries no body (flag updates, EXISTS, ...).
    Skipped,
    /// The tagged OK that ends the FETCH.
    Done,
}

/// IMAP client connection.
pub struct Client<S> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    capabilities: Vec<Capability>,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tags", &self.tags)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting.
    ///
    /// A `BYE` greeting (server refusing the connection) is an error, as is
    /// anything that is not an untagged `OK` or `PREAUTH`.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let capabilities = match ResponseParser::parse(&greeting)? {
            Response::Untagged(
                UntaggedResponse::Ok { code, .. } | UntaggedResponse::PreAuth { code, .. },
            ) => match code {
                Some(ResponseCode::Capability(caps)) => caps,
                _ => Vec::new(),
            },
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        };
        debug!(capabilities = capabilities.len(), "received greeting");

        Ok(Self {
            stream: framed,
            tags: TagGenerator::default(),
            capabilities,
        })
    }

    /// Checks if the server advertised a capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Sends CAPABILITY and replaces the stored capabilities.
    pub async fn capability(&mut self) -> Result<&[Capability]> {
        let untagged = self.execute(&Command::Capability).await?;
        for response in untagged {
            if let UntaggedResponse::Capability(caps) = response {
                self.capabilities = caps;
            }
        }
        Ok(&self.capabilities)
    }

    /// Authenticates with LOGIN. A `NO` becomes [`Error::Auth`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::Auth(
                "server disabled LOGIN on this connection; enable TLS or STARTTLS".to_string(),
            ));
        }

        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let untagged = match self.execute(&command).await {
            Err(Error::No(text)) => return Err(Error::Auth(text)),
            other => other?,
        };

        for response in untagged {
            if let UntaggedResponse::Capability(caps) = response {
                self.capabilities = caps;
            }
        }
        Ok(())
    }

    /// Selects a mailbox and returns its message count.
    pub async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let command = Command::Select {
            mailbox: mailbox.to_string(),
        };
        let untagged = self.execute(&command).await?;

        Ok(untagged
            .iter()
            .find_map(|r| match r {
                UntaggedResponse::Exists(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0))
    }

    /// Searches the selected mailbox.
    pub async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<SeqNum>> {
        let command = Command::Search {
            criteria: criteria.clone(),
        };
        let untagged = self.execute(&command).await?;

        let mut ids: Vec<SeqNum> = untagged
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Sends a FETCH without waiting for its completion and returns the tag.
    /// Drive it with [`next_fetch_event`](Self::next_fetch_event).
    pub async fn start_fetch(
        &mut self,
        sequence: SequenceSet,
        items: Vec<FetchAttribute>,
    ) -> Result<String> {
        let command = Command::Fetch { sequence, items };
        let tag = self.tags.next();
        debug!(%tag, command = command.name(), "sending command");
        self.stream.write_command(&command.serialize(&tag)).await?;
        Ok(tag)
    }

    /// Reads the next response of the FETCH started under `tag`.
    pub async fn next_fetch_event(&mut self, tag: &str) -> Result<FetchEvent> {
        let bytes = self.stream.read_response().await?;

        match ResponseParser::parse(&bytes)? {
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => Err(Error::Bye(text)),
            Response::Untagged(untagged) => Ok(untagged
                .into_fetched_body()
                .map_or(FetchEvent::Skipped, |(seq, body)| {
                    FetchEvent::Message(seq, body)
                })),
            Response::Tagged {
                tag: done,
                status,
                text,
                ..
            } if done.as_str() == tag => {
                check_status(status, text)?;
                Ok(FetchEvent::Done)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Sends LOGOUT and waits for the server to acknowledge it. The `BYE`
    /// that precedes the tagged OK is expected.
    pub async fn logout(&mut self) -> Result<()> {
        match self.execute(&Command::Logout).await {
            // Some servers hang up right after BYE.
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
            other => other.map(drop),
        }
    }

    /// Shuts down the transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await
    }

    /// Sends one command and reads up to and including its tagged
    /// completion, returning the untagged data received in between.
    async fn execute(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        let tag = self.tags.next();
        debug!(%tag, command = command.name(), "sending command");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let mut untagged = Vec::new();
        loop {
            let bytes = self.stream.read_response().await?;
            match ResponseParser::parse(&bytes)? {
                Response::Tagged {
                    tag: done,
                    status,
                    text,
                    ..
                } if done.as_str() == tag => {
                    debug!(%tag, ?status, "command completed");
                    check_status(status, text)?;
                    return Ok(untagged);
                }
                Response::Untagged(UntaggedResponse::Bye { text, .. })
                    if !matches!(command, Command::Logout) =>
                {
                    return Err(Error::Bye(text));
                }
                Response::Untagged(response) => untagged.push(response),
                other => return Err(unexpected(&other)),
            }
        }
    }
}

impl Client<ImapStream> {
    /// Upgrades the connection with STARTTLS and refreshes the capabilities,
    /// which must not be trusted across the upgrade.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if !self.has_capability(&Capability::StartTls) {
            return Err(Error::Protocol(
                "server does not advertise STARTTLS".to_string(),
            ));
        }

        self.execute(&Command::StartTls).await?;
        debug!(host, "upgrading connection to TLS");

        let stream = self.stream.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            stream: FramedStream::new(stream),
            tags: self.tags,
            capabilities: Vec::new(),
        };
        client.capability().await?;
        Ok(client)
    }
}

fn check_status(status: Status, text: String) -> Result<()> {
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No(text)),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}

fn unexpected(response: &Response) -> Error {
    match response {
        Response::Tagged { tag, .. } => Error::Protocol(format!("unexpected tag {tag}")),
        Response::Continuation { .. } => {
            Error::Protocol("unexpected continuation request".to_string())
        }
        Response::Untagged(_) => Error::Protocol(format!("unexpected response: {response:?}")),
    }
}
