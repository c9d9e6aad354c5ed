//! One-shot message submission.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::client::{Client, Connected, MailReady};
use super::config::{Config, Security};
use super::stream::connect;
use crate::error::{Error, Result};
use crate::types::Envelope;

/// Username and password for SMTP AUTH.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    password: String,
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

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connects, optionally upgrades with STARTTLS, and submits one message.
///
/// # Errors
///
/// Returns the first failure: connecting, TLS, authentication, or any
/// refused step of the transaction.
pub async fn send(
    config: &Config,
    credentials: Option<&Credentials>,
    envelope: &Envelope,
    message: &[u8],
) -> Result<()> {
    debug!(host = %config.host, port = config.port, security = ?config.security, "Connecting to SMTP server");
    let stream = connect(config).await?;
    let client = Client::from_stream(stream, config.io_timeout)
        .await?
        .ehlo(&config.client_name)
        .await?;
    let client = match config.security {
        Security::StartTls => client.starttls(&config.host).await?,
        Security::None | Security::Implicit => client,
    };
    deliver(client, credentials, envelope, message).await
}

/// Runs AUTH (when credentials are given), the mail transaction and QUIT on
/// a client that has already completed EHLO.
///
/// A failing QUIT after the message was accepted is logged, not returned.
///
/// # Errors
///
/// Returns an error if authentication or any step up to the end of DATA
/// fails.
pub async fn deliver<S>(
    client: Client<Connected, S>,
    credentials: Option<&Credentials>,
    envelope: &Envelope,
    message: &[u8],
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match credentials {
        Some(creds) => {
            let client = client
                .authenticate(&creds.username, &creds.password)
                .await?;
            transfer(client, envelope, message).await
        }
        None => transfer(client, envelope, message).await,
    }
}

async fn transfer<State, S>(client: Client<State, S>, envelope: &Envelope, message: &[u8]) -> Result<()>
where
    State: MailReady,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (first, rest) = envelope
        .recipients()
        .split_first()
        .ok_or_else(|| Error::InvalidAddress("Envelope has no recipients".into()))?;

    let mut client = client
        .mail_from(envelope.sender().clone(), Some(message.len()))
        .await?
        .rcpt_to(first.clone())
        .await?;
    for rcpt in rest {
        client = client.rcpt_to(rcpt.clone()).await?;
    }
    let client = client.data().await?.send_message(message).await?;
    debug!(recipients = envelope.recipients().len(), "SMTP transaction complete");

    if let Err(e) = client.quit().await {
        warn!(error = %e, "SMTP QUIT failed after the message was accepted");
    }
    Ok(())
}
