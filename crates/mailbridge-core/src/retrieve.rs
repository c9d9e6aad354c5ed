//! Unseen-inbox retrieval.
//!
//! One call opens a fresh session, searches the inbox for unseen messages,
//! fetches the most recent `limit` of them, decodes them concurrently and
//! closes the session on every path before returning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailbridge_imap::{self as imap, FetchOptions, ImapStream, SearchCriteria, Session};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::config::MailboxConfig;
use crate::decoder::EmailRecord;
use crate::error::{MailError, Result};

/// Smallest accepted `limit`.
pub const MIN_LIMIT: u32 = 1;
/// Largest accepted `limit`.
pub const MAX_LIMIT: u32 = 50;
/// `limit` used when the caller gives none.
pub const DEFAULT_LIMIT: u32 = 5;

const INBOX: &str = "INBOX";

/// Opens the connection behind a [`Session`].
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Transport the session runs over.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Bound for every command round-trip of the session.
    fn io_timeout(&self) -> Duration;

    /// Connects and logs `session` in.
    async fn connect(&self, session: &mut Session<Self::Stream>) -> imap::Result<()>;
}

/// Dials the configured mailbox store.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: Arc<MailboxConfig>,
}

impl ImapConnector {
    /// Creates a connector for `config`.
    #[must_use]
    pub const fn new(config: Arc<MailboxConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    type Stream = ImapStream;

    fn io_timeout(&self) -> Duration {
        self.config.server.io_timeout
    }

    async fn connect(&self, session: &mut Session<ImapStream>) -> imap::Result<()> {
        session
            .connect(&self.config.server, &self.config.credentials)
            .await
    }
}

/// Outcome of a retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalResult {
    /// Decoded messages, ordered by identifier.
    Messages(Vec<EmailRecord>),
    /// The search matched nothing.
    NoNewMessages,
}

impl RetrievalResult {
    /// Renders the result for a tool response: `No new messages`, or the
    /// records as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Internal`] if serialization fails.
    pub fn to_text(&self) -> Result<String> {
        match self {
            Self::NoNewMessages => Ok("No new messages".to_string()),
            Self::Messages(records) => {
                serde_json::to_string_pretty(records).map_err(|e| MailError::Internal(e.to_string()))
            }
        }
    }
}

/// Runs retrievals through a [`MailboxConnector`].
#[derive(Debug, Clone)]
pub struct Retriever<C> {
    connector: C,
}

impl<C: MailboxConnector> Retriever<C> {
    /// Creates a retriever.
    #[must_use]
    pub const fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Returns the `limit` most recent unseen inbox messages.
    ///
    /// Fetching sets `\Seen` on the returned messages, so a second call does
    /// not see them again.
    ///
    /// # Errors
    ///
    /// [`MailError::Validation`] for a `limit` outside `1..=50`, before any
    /// connection is made. Otherwise the error of the failing stage.
    pub async fn retrieve_unseen(&self, limit: u32) -> Result<RetrievalResult> {
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            return Err(MailError::Validation(format!(
                "Limit must be between {MIN_LIMIT} and {MAX_LIMIT}"
            )));
        }

        let mut session = Session::new(self.connector.io_timeout());
        let outcome = self.run(&mut session, limit).await;
        session.close().await;

        match &outcome {
            Ok(RetrievalResult::Messages(records)) => {
                info!(count = records.len(), "retrieved unseen messages");
            }
            Ok(RetrievalResult::NoNewMessages) => info!("no unseen messages"),
            Err(e) => warn!(error = %e, "retrieval failed"),
        }
        outcome
    }

    async fn run(&self, session: &mut Session<C::Stream>, limit: u32) -> Result<RetrievalResult> {
        self.connector
            .connect(session)
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;

        session
            .select_folder(INBOX)
            .await
            .map_err(|e| stage_error(&e, MailError::Folder))?;

        let mut found = session
            .search(&SearchCriteria::Unseen)
            .await
            .map_err(|e| stage_error(&e, MailError::Search))?;
        if found.is_empty() {
            return Ok(RetrievalResult::NoNewMessages);
        }

        found.sort_unstable();
        found.dedup();
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let recent = &found[found.len().saturating_sub(take)..];
        debug!(matched = found.len(), fetching = recent.len(), "fetching most recent unseen");

        let stream = session
            .fetch(recent, FetchOptions::default())
            .await
            .map_err(|e| MailError::Fetch(e.to_string()))?;
        let records = aggregate(stream, recent).await?;

        Ok(RetrievalResult::Messages(records))
    }
}

/// A broken or silent connection is a connection failure whatever the
/// step; only a server refusal belongs to the step itself.
fn stage_error(error: &imap::Error, stage: fn(String) -> MailError) -> MailError {
    if error.is_fatal() {
        MailError::Connection(error.to_string())
    } else {
        stage(error.to_string())
    }
}
