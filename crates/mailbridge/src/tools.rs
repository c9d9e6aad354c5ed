//! Tool catalogue and argument decoding.

use mailbridge_core::{DEFAULT_LIMIT, MAX_LIMIT, MIN_LIMIT, SendRequest};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::protocol::RpcError;

/// Name of the sending tool.
pub const SEND_EMAIL: &str = "send_email";
/// Name of the retrieval tool.
pub const RECEIVE_EMAIL: &str = "receive_email";

/// A decoded `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    /// Send one message.
    SendEmail(SendRequest),
    /// Fetch the most recent unseen messages. Range checking is left to the
    /// retriever.
    ReceiveEmail {
        /// Requested count.
        limit: u32,
    },
}

/// Tool definitions for `tools/list`.
#[must_use]
pub fn definitions() -> Value {
    json!([
        {
            "name": SEND_EMAIL,
            "description": "Send an email with optional CC recipients",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "to": {
                        "type": "string",
                        "description": "Recipient email address"
                    },
                    "subject": {
                        "type": "string",
                        "description": "Email subject"
                    },
                    "text": {
                        "type": "string",
                        "description": "Email body text"
                    },
                    "cc": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "CC recipients (optional)"
                    }
                },
                "required": ["to", "subject", "text"]
            }
        },
        {
            "name": RECEIVE_EMAIL,
            "description": "Receive latest unseen emails from inbox. Returned messages are marked as read.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "number",
                        "description": format!("Number of latest emails to fetch (default: {DEFAULT_LIMIT})"),
                        "minimum": MIN_LIMIT,
                        "maximum": MAX_LIMIT
                    }
                }
            }
        }
    ])
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendEmailArgs {
    to: Option<String>,
    subject: Option<String>,
    text: Option<String>,
    cc: Option<Vec<String>>,
}

/// Decodes the `params` of a `tools/call`.
///
/// # Errors
///
/// `-32601` for an unknown tool, `-32602` for params or arguments of the
/// wrong shape.
pub fn parse_call(params: Option<Value>) -> Result<ToolCall, RpcError> {
    let params: CallParams = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(format!("Invalid tool call: {e}")))?;
    let arguments = Value::Object(params.arguments.unwrap_or_default());

    match params.name.as_str() {
        SEND_EMAIL => {
            let args: SendEmailArgs = serde_json::from_value(arguments)
                .map_err(|e| RpcError::invalid_params(format!("Invalid arguments: {e}")))?;
            Ok(ToolCall::SendEmail(SendRequest {
                to: args.to.unwrap_or_default(),
                subject: args.subject.unwrap_or_default(),
                text: args.text.unwrap_or_default(),
                cc: args.cc,
            }))
        }
        RECEIVE_EMAIL => Ok(ToolCall::ReceiveEmail {
            limit: parse_limit(arguments.get("limit"))?,
        }),
        other => Err(RpcError::method_not_found(format!("Unknown tool: {other}"))),
    }
}

/// Missing or `null` means the default. Integers outside `u32` map to 0 so
/// the retriever rejects them with its usual message.
fn parse_limit(value: Option<&Value>) -> Result<u32, RpcError> {
    let number = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_LIMIT),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(RpcError::invalid_params("Limit must be a number")),
    };

    if let Some(n) = number.as_i64() {
        return Ok(u32::try_from(n).unwrap_or(0));
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= f64::from(u32::MAX) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Ok(f as u32)
        }
        Some(f) if f.fract() == 0.0 => Ok(0),
        _ => Err(RpcError::invalid_params("Limit must be an integer")),
    }
}
