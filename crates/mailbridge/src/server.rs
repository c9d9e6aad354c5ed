//! Line-delimited JSON-RPC server loop.
//!
//! Each request runs in its own task so a slow retrieval does not hold up
//! `ping` or `tools/list`. Responses go through one writer task, which keeps
//! output lines whole.

use std::sync::Arc;

use mailbridge_core::{MailError, MailTransport, MailboxConnector, Retriever, Sender};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{Incoming, PROTOCOL_VERSION, Request, RequestId, Response, RpcError, methods};
use crate::tools::{self, ToolCall};

/// Name announced in `initialize`.
pub const SERVER_NAME: &str = "email";

/// Dispatches requests to the mail operations.
pub struct Server<C, T> {
    retriever: Retriever<C>,
    sender: Sender<T>,
}

impl<C, T> Server<C, T>
where
    C: MailboxConnector + 'static,
    T: MailTransport + 'static,
{
    /// Creates a server.
    #[must_use]
    pub const fn new(retriever: Retriever<C>, sender: Sender<T>) -> Self {
        Self { retriever, sender }
    }

    /// Serves `input` until end of file, then waits for in-flight requests
    /// and returns once every response has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if reading `input` fails.
    pub async fn serve<R, W>(self: Arc<Self>, input: R, output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_responses(rx, output));

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Incoming::parse(line) {
                Incoming::Request(request) => {
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let response = server.respond(request).await;
                        // Only fails once the writer is gone
                        let _ = tx.send(response);
                    });
                }
                Incoming::Notification(notification) => {
                    debug!(method = %notification.method, "notification");
                }
                Incoming::Invalid(response) => {
                    warn!(error = ?response.error, "rejected input line");
                    let _ = tx.send(response);
                }
            }
        }

        debug!("input closed");
        drop(tx);
        if let Err(e) = writer.await {
            error!(error = %e, "response writer failed");
        }
        Ok(())
    }

    /// Handles one request in a child task so a panic becomes an internal
    /// error instead of a missing response.
    async fn respond(self: Arc<Self>, request: Request) -> Response {
        let id = request.id.clone();
        let method = request.method.clone();
        match tokio::spawn(async move { self.handle(request).await }).await {
            Ok(response) => response,
            Err(e) => {
                error!(%method, error = %e, "request task failed");
                Response::error(id, RpcError::internal(format!("Internal error: {e}")))
            }
        }
    }

    async fn handle(&self, request: Request) -> Response {
        let id = request.id;
        let result = match request.method.as_str() {
            methods::INITIALIZE => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => Ok(json!({ "tools": tools::definitions() })),
            methods::TOOLS_CALL => self.call_tool(id.as_ref(), request.params).await,
            other => Err(RpcError::method_not_found(format!("Method not found: {other}"))),
        };

        match result {
            Ok(value) => Response::success(id, value),
            Err(e) => Response::error(id, e),
        }
    }

    async fn call_tool(&self, id: Option<&RequestId>, params: Option<Value>) -> Result<Value, RpcError> {
        let call = tools::parse_call(params)?;
        let (tool, outcome) = match call {
            ToolCall::SendEmail(request) => {
                (tools::SEND_EMAIL, self.sender.send_email(&request).await)
            }
            ToolCall::ReceiveEmail { limit } => (
                tools::RECEIVE_EMAIL,
                self.retriever
                    .retrieve_unseen(limit)
                    .await
                    .and_then(|result| result.to_text()),
            ),
        };

        match outcome {
            Ok(text) => {
                info!(tool, id = ?id, "tool call succeeded");
                Ok(json!({
                    "_meta": {},
                    "content": [{ "type": "text", "text": text }],
                }))
            }
            Err(e) => {
                warn!(tool, id = ?id, error = %e, "tool call failed");
                Err(rpc_error(&e))
            }
        }
    }
}

fn rpc_error(error: &MailError) -> RpcError {
    if error.is_client_error() {
        RpcError::invalid_params(error.to_string())
    } else {
        RpcError::internal(error.to_string())
    }
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<Response>, mut output: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "response serialization failed");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = output.write_all(&line).await {
            error!(error = %e, "stdout write failed");
            break;
        }
        if let Err(e) = output.flush().await {
            error!(error = %e, "stdout flush failed");
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use mailbridge_imap::Session;
    use mailbridge_smtp::Envelope;
    use tokio::io::{AsyncReadExt, BufReader, DuplexStream};

    use super::*;

    /// Every connection attempt is refused.
    struct Unreachable;

    #[async_trait]
    impl MailboxConnector for Unreachable {
        type Stream = DuplexStream;

        fn io_timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        async fn connect(&self, _session: &mut Session<DuplexStream>) -> mailbridge_imap::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into())
        }
    }

    #[derive(Clone, Default)]
    struct Recording {
        sent: Arc<Mutex<Vec<Envelope>>>,
    }

    #[async_trait]
    impl MailTransport for Recording {
        async fn deliver(&self, envelope: &Envelope, _message: &[u8]) -> mailbridge_smtp::Result<()> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    /// Feeds `input` to a server and returns the response lines.
    async fn exchange(input: &str) -> (Vec<Value>, Recording) {
        let recording = Recording::default();
        let server = Arc::new(Server::new(
            Retriever::new(Unreachable),
            Sender::new(recording.clone(), "me@example.com"),
        ));

        let (output, mut read_back) = tokio::io::duplex(64 * 1024);
        server
            .serve(BufReader::new(input.as_bytes()), output)
            .await
            .unwrap();

        let mut raw = String::new();
        read_back.read_to_string(&mut raw).await.unwrap();
        let responses = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (responses, recording)
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses.iter().find(|r| r["id"] == id).unwrap()
    }

    #[tokio::test]
    async fn handshake_and_catalogue() {
        let (responses, _) = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 3);
        let init = by_id(&responses, 1);
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], "email");
        assert_eq!(init["result"]["capabilities"], json!({"tools": {}}));

        let tools = by_id(&responses, 2)["result"]["tools"].as_array().unwrap().len();
        assert_eq!(tools, 2);
        assert_eq!(by_id(&responses, 3)["result"], json!({}));
    }

    #[tokio::test]
    async fn send_email_round_trip() {
        let (responses, recording) = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"send_email","arguments":{"to":"u@v.com","subject":"S","text":"T"}}}"#,
            "\n",
        ))
        .await;

        let result = &by_id(&responses, 1)["result"];
        assert_eq!(result["_meta"], json!({}));
        assert_eq!(result["content"][0]["type"], "text");
        assert!(result["content"][0]["text"].as_str().unwrap().contains("u@v.com"));
        assert_eq!(recording.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_codes() {
        let (responses, recording) = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"send_email","arguments":{"to":"u@v.com","text":"T"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"receive_email","arguments":{"limit":51}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"receive_email"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#,
            "\n",
            "this is not json\n",
        ))
        .await;

        assert_eq!(responses.len(), 6);

        let missing = &by_id(&responses, 1)["error"];
        assert_eq!(missing["code"], RpcError::INVALID_PARAMS);
        assert_eq!(missing["message"], "Missing required parameters: to, subject, text");
        assert!(recording.sent.lock().unwrap().is_empty());

        let limit = &by_id(&responses, 2)["error"];
        assert_eq!(limit["code"], RpcError::INVALID_PARAMS);
        assert_eq!(limit["message"], "Limit must be between 1 and 50");

        let unreachable = &by_id(&responses, 3)["error"];
        assert_eq!(unreachable["code"], RpcError::INTERNAL_ERROR);
        assert!(unreachable["message"].as_str().unwrap().starts_with("IMAP error: "));

        assert_eq!(by_id(&responses, 4)["error"]["code"], RpcError::METHOD_NOT_FOUND);
        assert_eq!(by_id(&responses, 5)["error"]["code"], RpcError::METHOD_NOT_FOUND);

        let parse = responses.iter().find(|r| r["id"].is_null()).unwrap();
        assert_eq!(parse["error"]["code"], RpcError::PARSE_ERROR);
    }
}
