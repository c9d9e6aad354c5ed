//! Framed I/O for the IMAP protocol.
//!
//! A server response is a CRLF-terminated line that may announce literals
//! (`{n}\r\n` followed by exactly n raw bytes), after which the line goes on.
//! [`FramedStream::read_response`] returns one whole response, literals
//! included, ready for [`ResponseParser`](crate::parser::ResponseParser).

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Upper bound on a single line, excluding literal payloads.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Upper bound on a single literal.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Buffered, response-framed IMAP connection.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    response: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            response: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        self.response.clear();

        loop {
            let line_start = self.response.len();
            self.read_line().await?;

            let Some(literal_len) = parse_literal_length(&self.response[line_start..]) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let start = self.response.len();
            self.response.resize(start + literal_len, 0);
            self.reader.read_exact(&mut self.response[start..]).await?;
        }

        Ok(self.response.to_vec())
    }

    /// Appends one CRLF-terminated line to the response buffer.
    async fn read_line(&mut self) -> Result<()> {
        let mut line_len = 0usize;

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }

            // A CR may have ended the previous chunk.
            let carried_cr = line_len > 0 && self.response.last() == Some(&b'\r');
            if carried_cr && buf[0] == b'\n' {
                self.response.extend_from_slice(b"\n");
                self.reader.consume(1);
                return Ok(());
            }

            if let Some(pos) = find_crlf(buf) {
                self.response.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                return Ok(());
            }

            let len = buf.len();
            self.response.extend_from_slice(buf);
            self.reader.consume(len);
            line_len += len;

            if line_len > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes one serialized command and flushes it.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shuts down the write half of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Only valid at a response boundary: buffered bytes are discarded. The
    /// STARTTLS upgrade relies on the server sending nothing after its OK.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses the literal length announced at the end of a line, `{123}\r\n` or
/// the non-synchronizing `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);

    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
}
