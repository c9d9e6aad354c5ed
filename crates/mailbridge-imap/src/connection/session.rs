//! One mailbox session: connect, select, search, fetch, close.
//!
//! A [`Session`] tracks its state at runtime so misuse is reported as
//! [`Error::InvalidState`] instead of reaching the server:
//!
//! ```text
//! Disconnected -> Connecting -> Ready -> FolderSelected <-> Searching
//!                                              ^
//!                                              +--------> Fetching
//! any non-terminal state --failure--> Errored      any state --close()--> Closed
//! ```
//!
//! `Errored` absorbs everything except [`Session::close`]. Every network
//! step is bounded by the session's I/O timeout.

#![allow(clippy::missing_errors_doc)]

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::client::{Client, FetchEvent};
use super::config::{Config, Security};
use super::stream::{self, ImapStream, with_timeout};
use crate::command::{FetchAttribute, SearchCriteria};
use crate::types::{SeqNum, SequenceSet};
use crate::{Error, Result};

/// Login credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected yet.
    Disconnected,
    /// Connect and login in progress.
    Connecting,
    /// Logged in, no folder selected.
    Ready,
    /// A folder is selected and the session is idle.
    FolderSelected,
    /// A SEARCH is in flight.
    Searching,
    /// A FETCH is being streamed.
    Fetching,
    /// Closed; the connection has been released.
    Closed,
    /// A step failed. Only [`Session::close`] is accepted.
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::FolderSelected => "folder selected",
            Self::Searching => "searching",
            Self::Fetching => "fetching",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Options for [`Session::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Let the server set `\Seen` on fetched messages (`BODY[]`). When false
    /// the fetch uses `BODY.PEEK[]` and leaves flags alone.
    pub mark_seen: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { mark_seen: true }
    }
}

/// A live connection to one mailbox store.
pub struct Session<S> {
    client: Option<Client<S>>,
    state: SessionState,
    selected: Option<String>,
    io_timeout: Duration,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("selected", &self.selected)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl Session<ImapStream> {
    /// Opens a TCP or TLS connection per `config`, upgrades it with STARTTLS
    /// when configured, and logs in.
    pub async fn connect(&mut self, config: &Config, credentials: &Credentials) -> Result<()> {
        self.begin_connect()?;
        self.io_timeout = config.io_timeout;
        debug!(host = %config.host, port = config.port, security = ?config.security, "connecting");

        let connected = async {
            let stream = stream::connect(config).await?;
            let client = with_timeout(config.io_timeout, Client::from_stream(stream)).await?;
            if config.security == Security::StartTls {
                with_timeout(config.connect_timeout, client.starttls(&config.host)).await
            } else {
                Ok(client)
            }
        }
        .await;

        match connected {
            Ok(client) => self.authenticate(client, credentials).await,
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a disconnected session whose commands are bounded by
    /// `io_timeout`.
    #[must_use]
    pub const fn new(io_timeout: Duration) -> Self {
        Self {
            client: None,
            state: SessionState::Disconnected,
            selected: None,
            io_timeout,
        }
    }

    /// Runs the greeting and login over an already-open stream.
    pub async fn connect_with(&mut self, stream: S, credentials: &Credentials) -> Result<()> {
        self.begin_connect()?;

        match with_timeout(self.io_timeout, Client::from_stream(stream)).await {
            Ok(client) => self.authenticate(client, credentials).await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Name of the selected folder, if any.
    #[must_use]
    pub fn selected_folder(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Selects a folder. Allowed when `Ready` or `FolderSelected`.
    pub async fn select_folder(&mut self, name: &str) -> Result<u32> {
        self.require(&[SessionState::Ready, SessionState::FolderSelected], "select a folder")?;

        let result = match self.client.as_mut() {
            Some(client) => with_timeout(self.io_timeout, client.select(name)).await,
            None => Err(missing_connection()),
        };

        match result {
            Ok(exists) => {
                debug!(folder = name, exists, "folder selected");
                self.selected = Some(name.to_string());
                self.state = SessionState::FolderSelected;
                Ok(exists)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Searches the selected folder. Requires `FolderSelected`.
    pub async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<SeqNum>> {
        self.require(&[SessionState::FolderSelected], "search")?;
        self.state = SessionState::Searching;

        let result = match self.client.as_mut() {
            Some(client) => with_timeout(self.io_timeout, client.search(criteria)).await,
            None => Err(missing_connection()),
        };

        match result {
            Ok(ids) => {
                debug!(matches = ids.len(), "search completed");
                self.state = SessionState::FolderSelected;
                Ok(ids)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Starts a bulk FETCH of full message bodies. Requires
    /// `FolderSelected`.
    ///
    /// The returned stream must be drained to get the session back to
    /// `FolderSelected`; dropping it early leaves the session `Errored` and
    /// releases the connection, since the rest of the response is still
    /// unread.
    /// An empty `ids` yields an empty stream without contacting the server.
    pub async fn fetch(&mut self, ids: &[SeqNum], options: FetchOptions) -> Result<FetchStream<'_, S>> {
        self.require(&[SessionState::FolderSelected], "fetch")?;

        let Some(sequence) = SequenceSet::from_ids(ids) else {
            return Ok(FetchStream {
                session: self,
                tag: String::new(),
                done: true,
            });
        };

        self.state = SessionState::Fetching;
        let items = vec![FetchAttribute::FullBody {
            peek: !options.mark_seen,
        }];

        let result = match self.client.as_mut() {
            Some(client) => with_timeout(self.io_timeout, client.start_fetch(sequence, items)).await,
            None => Err(missing_connection()),
        };

        match result {
            Ok(tag) => Ok(FetchStream {
                session: self,
                tag,
                done: false,
            }),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Closes the session. Idempotent and infallible.
    ///
    /// Sends LOGOUT best-effort within the I/O timeout, shuts the transport
    /// down and releases it. A second call finds nothing to release.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = with_timeout(self.io_timeout, client.logout()).await {
                warn!(error = %e, "logout failed");
            }
            if let Err(e) = with_timeout(self.io_timeout, client.shutdown()).await {
                debug!(error = %e, "transport shutdown failed");
            }
            debug!("session closed");
        }
        self.selected = None;
        self.state = SessionState::Closed;
    }

    fn begin_connect(&mut self) -> Result<()> {
        self.require(&[SessionState::Disconnected], "connect")?;
        self.state = SessionState::Connecting;
        Ok(())
    }

    async fn authenticate(&mut self, mut client: Client<S>, credentials: &Credentials) -> Result<()> {
        match with_timeout(
            self.io_timeout,
            client.login(&credentials.username, &credentials.password),
        )
        .await
        {
            Ok(()) => {
                debug!(user = %credentials.username, "logged in");
                self.client = Some(client);
                self.state = SessionState::Ready;
                Ok(())
            }
            // Without a login the connection is useless; it is dropped here.
            Err(e) => Err(self.fail(e)),
        }
    }

    fn require(&self, allowed: &[SessionState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "cannot {action} while session is {}",
                self.state
            )))
        }
    }

    /// Records a failure: the session becomes `Errored`, and the connection
    /// is dropped when it can no longer be trusted.
    fn fail(&mut self, error: Error) -> Error {
        warn!(state = %self.state, error = %error, "session step failed");
        if error.is_fatal() {
            self.client = None;
        }
        self.state = SessionState::Errored;
        error
    }
}

fn missing_connection() -> Error {
    Error::InvalidState("session has no connection".to_string())
}

/// Messages of one FETCH, in server delivery order.
pub struct FetchStream<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session: &'a mut Session<S>,
    tag: String,
    done: bool,
}

impl<S> FetchStream<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Waits for the next message.
    ///
    /// Returns `None` after the server's tagged OK. An error item ends the
    /// stream; the session is then `Errored`.
    pub async fn next(&mut self) -> Option<Result<(SeqNum, Vec<u8>)>> {
        if self.done {
            return None;
        }

        loop {
            let event = match self.session.client.as_mut() {
                Some(client) => {
                    with_timeout(self.session.io_timeout, client.next_fetch_event(&self.tag)).await
                }
                None => Err(missing_connection()),
            };

            match event {
                Ok(FetchEvent::Message(seq, body)) => {
                    debug!(%seq, bytes = body.len(), "message fetched");
                    return Some(Ok((seq, body)));
                }
                Ok(FetchEvent::Skipped) => {}
                Ok(FetchEvent::Done) => {
                    self.done = true;
                    self.session.state = SessionState::FolderSelected;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(self.session.fail(e)));
                }
            }
        }
    }
}

impl<S> Drop for FetchStream<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn drop(&mut self) {
        // Unread FETCH data is still on the wire
        if !self.done {
            debug!("fetch stream dropped before completion");
            self.session.state = SessionState::Errored;
            self.session.client = None;
        }
    }
}
