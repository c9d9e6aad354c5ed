//! `mailbridge` - MCP server for sending and receiving email
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout and exposes two tools,
//! `send_email` and `receive_email`. Logs go to stderr.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod protocol;
mod server;
mod tools;

use std::sync::Arc;

use anyhow::Context;
use mailbridge_core::{Config, ImapConnector, Retriever, Sender, SmtpTransport};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Read before logging starts so RUST_LOG can come from .env too
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailbridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "ignoring unreadable .env file"),
    }

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        imap = %format!("{}:{}", config.mailbox.server.host, config.mailbox.server.port),
        smtp = %format!("{}:{}", config.smtp.server.host, config.smtp.server.port),
        "starting email MCP server"
    );

    let retriever = Retriever::new(ImapConnector::new(Arc::new(config.mailbox)));
    let sender = Sender::new(
        SmtpTransport::new(Arc::new(config.smtp.clone())),
        config.smtp.from,
    );
    let server = Arc::new(Server::new(retriever, sender));

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        served = server.serve(stdin, tokio::io::stdout()) => {
            served.context("reading stdin failed")?;
            info!("stdin closed, shutting down");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("installing the interrupt handler failed")?;
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}
