//! Concurrent decoding of a fetch stream.
//!
//! Every message is handed to a blocking decode task as soon as its bytes
//! arrive, while the stream keeps being read. The first failure ends the
//! whole aggregation; nothing partial is returned.

use std::collections::BTreeSet;

use mailbridge_imap::{FetchStream, SeqNum};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::decoder::{DecodeError, EmailRecord, decode};
use crate::error::MailError;

type Decoded = (SeqNum, Result<EmailRecord, DecodeError>);

/// Drains `stream`, decodes every message, and returns the records ordered
/// by identifier.
///
/// `requested` is the identifier set the stream was opened for. Exactly one
/// record comes back per requested identifier.
///
/// Outstanding decode tasks are abandoned on failure: the join set is
/// dropped and tasks already running finish unobserved.
///
/// # Errors
///
/// - [`MailError::Fetch`] when the stream yields an error, delivers an
///   identifier that was not requested or already delivered, or ends
///   before every requested identifier arrived
/// - [`MailError::Decode`] when any message fails to decode
/// - [`MailError::Internal`] when a decode task panics
pub async fn aggregate<S>(
    mut stream: FetchStream<'_, S>,
    requested: &[SeqNum],
) -> Result<Vec<EmailRecord>, MailError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut pending: BTreeSet<SeqNum> = requested.iter().copied().collect();
    let mut tasks: JoinSet<Decoded> = JoinSet::new();
    let mut records = Vec::with_capacity(pending.len());

    loop {
        // The read stays pinned while finished decodes are collected, so a
        // half-received response is never abandoned.
        let item = {
            let next = stream.next();
            tokio::pin!(next);
            loop {
                tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        records.push(settle(joined)?);
                    }
                    item = &mut next => break item,
                }
            }
        };

        let Some(item) = item else { break };
        let (seq, raw) = item.map_err(|e| MailError::Fetch(e.to_string()))?;
        if !pending.remove(&seq) {
            warn!(%seq, "unrequested or repeated message in fetch");
            return Err(MailError::Fetch(format!(
                "server returned unexpected message {seq}"
            )));
        }
        tasks.spawn_blocking(move || (seq, decode(&raw)));
    }
    drop(stream);

    if !pending.is_empty() {
        let missing: Vec<String> = pending.iter().map(ToString::to_string).collect();
        warn!(missing = %missing.join(","), "fetch ended with messages missing");
        return Err(MailError::Fetch(format!(
            "server did not return message(s) {}",
            missing.join(", ")
        )));
    }

    while let Some(joined) = tasks.join_next().await {
        records.push(settle(joined)?);
    }

    records.sort_by_key(|(seq, _)| *seq);
    debug!(count = records.len(), "messages decoded");
    Ok(records.into_iter().map(|(_, record)| record).collect())
}

fn settle(joined: Result<Decoded, JoinError>) -> Result<(SeqNum, EmailRecord), MailError> {
    match joined {
        Ok((seq, Ok(record))) => Ok((seq, record)),
        Ok((seq, Err(e))) => {
            warn!(%seq, error = %e, "message decode failed");
            Err(MailError::Decode(e.to_string()))
        }
        Err(e) if e.is_panic() => Err(MailError::Internal("decode task panicked".to_string())),
        Err(e) => Err(MailError::Internal(e.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use mailbridge_imap::{Credentials, FetchOptions, SearchCriteria, Session, SessionState};
    use tokio::io::AsyncWriteExt;
    use tokio_test::io::Builder;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn literal(body: &str) -> String {
        format!("{{{}}}\r\n{body}", body.len())
    }

    fn fetch_line(seq: u32, body: &str) -> String {
        format!("* {seq} FETCH (BODY[] {})\r\n", literal(body))
    }

    fn message(subject: &str) -> String {
        format!("Subject: {subject}\r\n\r\nbody of {subject}\r\n")
    }

    fn ids(values: &[u32]) -> Vec<SeqNum> {
        values.iter().map(|v| SeqNum::new(*v).unwrap()).collect()
    }

    #[tokio::test]
    async fn records_come_back_in_identifier_order() {
        // Server delivers 3 before 2
        let mut responses = fetch_line(3, &message("third"));
        responses.push_str(&fetch_line(2, &message("second")));
        responses.push_str("A0003 OK FETCH completed\r\n");

        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN bob pw\r\n")
            .read(b"A0001 OK LOGIN completed\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
            .write(b"A0003 FETCH 2:3 (BODY[])\r\n")
            .read(responses.as_bytes())
            .build();

        let mut session = Session::new(TIMEOUT);
        session.connect_with(mock, &Credentials::new("bob", "pw")).await.unwrap();
        session.select_folder("INBOX").await.unwrap();
        let requested = ids(&[2, 3]);
        let stream = session.fetch(&requested, FetchOptions::default()).await.unwrap();

        let records = aggregate(stream, &requested).await.unwrap();
        let subjects: Vec<_> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, ["second", "third"]);
        assert_eq!(session.state(), SessionState::FolderSelected);
    }

    #[tokio::test]
    async fn stream_error_is_a_fetch_error() {
        let mut responses = fetch_line(1, &message("one"));
        responses.push_str("A0003 NO FETCH failed\r\n");

        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN bob pw\r\n")
            .read(b"A0001 OK LOGIN completed\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"A0002 OK SELECT completed\r\n")
            .write(b"A0003 FETCH 1:2 (BODY[])\r\n")
            .read(responses.as_bytes())
            .build();

        let mut session = Session::new(TIMEOUT);
        session.connect_with(mock, &Credentials::new("bob", "pw")).await.unwrap();
        session.select_folder("INBOX").await.unwrap();
        let requested = ids(&[1, 2]);
        let stream = session.fetch(&requested, FetchOptions::default()).await.unwrap();

        let err = aggregate(stream, &requested).await.unwrap_err();
        assert!(matches!(err, MailError::Fetch(ref m) if m.contains("FETCH failed")), "{err:?}");
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[tokio::test]
    async fn one_bad_message_fails_the_batch() {
        // The whole server side is written up front, so the outcome does not
        // depend on whether the failure is seen mid-stream or after it.
        let (client, mut server) = tokio::io::duplex(64 * 1024);

        let mut script = String::from("* OK ready\r\nA0001 OK LOGIN completed\r\n");
        script.push_str("* 5 EXISTS\r\nA0002 OK SELECT completed\r\n");
        script.push_str("* SEARCH 1 2 3 4 5\r\nA0003 OK SEARCH completed\r\n");
        for seq in 1..=5 {
            // Message 3 has no header block
            let body = if seq == 3 {
                "\r\nnot a message".to_string()
            } else {
                message(&format!("m{seq}"))
            };
            script.push_str(&fetch_line(seq, &body));
        }
        script.push_str("A0004 OK FETCH completed\r\n");
        script.push_str("* BYE logging out\r\nA0005 OK LOGOUT completed\r\n");
        server.write_all(script.as_bytes()).await.unwrap();

        let mut session = Session::new(TIMEOUT);
        session.connect_with(client, &Credentials::new("bob", "pw")).await.unwrap();
        session.select_folder("INBOX").await.unwrap();
        let found = session.search(&SearchCriteria::Unseen).await.unwrap();
        assert_eq!(found.len(), 5);

        let stream = session.fetch(&found, FetchOptions::default()).await.unwrap();
        let err = aggregate(stream, &found).await.unwrap_err();
        assert!(matches!(err, MailError::Decode(_)), "{err:?}");

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn empty_fetch_yields_no_records() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN bob pw\r\n")
            .read(b"A0001 OK LOGIN completed\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"A0002 OK SELECT completed\r\n")
            .build();

        let mut session = Session::new(TIMEOUT);
        session.connect_with(mock, &Credentials::new("bob", "pw")).await.unwrap();
        session.select_folder("INBOX").await.unwrap();
        let stream = session.fetch(&[], FetchOptions::default()).await.unwrap();

        assert!(aggregate(stream, &[]).await.unwrap().is_empty());
    }

    /// Logs in and selects INBOX over a duplex pipe whose server side has
    /// already written `fetch_responses` after the opening exchange.
    async fn duplex_session(
        fetch_responses: &str,
        io_timeout: Duration,
    ) -> (Session<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let script = format!(
            "* OK ready\r\nA0001 OK LOGIN completed\r\nA0002 OK SELECT completed\r\n{fetch_responses}"
        );
        server.write_all(script.as_bytes()).await.unwrap();

        let mut session = Session::new(io_timeout);
        session.connect_with(client, &Credentials::new("bob", "pw")).await.unwrap();
        session.select_folder("INBOX").await.unwrap();
        (session, server)
    }

    #[tokio::test]
    async fn omitted_message_is_a_fetch_error() {
        // 2 was expunged between SEARCH and FETCH
        let mut responses = fetch_line(1, &message("one"));
        responses.push_str("A0003 OK FETCH completed\r\n");

        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN bob pw\r\n")
            .read(b"A0001 OK LOGIN completed\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"A0002 OK SELECT completed\r\n")
            .write(b"A0003 FETCH 1:2 (BODY[])\r\n")
            .read(responses.as_bytes())
            .build();

        let mut session = Session::new(TIMEOUT);
        session.connect_with(mock, &Credentials::new("bob", "pw")).await.unwrap();
        session.select_folder("INBOX").await.unwrap();
        let requested = ids(&[1, 2]);
        let stream = session.fetch(&requested, FetchOptions::default()).await.unwrap();

        let err = aggregate(stream, &requested).await.unwrap_err();
        assert!(matches!(err, MailError::Fetch(ref m) if m.contains("message(s) 2")), "{err:?}");
        // The FETCH itself completed, so the connection is still usable
        assert_eq!(session.state(), SessionState::FolderSelected);
    }

    #[tokio::test]
    async fn repeated_message_is_a_fetch_error() {
        let mut responses = fetch_line(1, &message("one"));
        responses.push_str(&fetch_line(1, &message("one again")));
        responses.push_str("A0003 OK FETCH completed\r\n");
        let (mut session, _server) = duplex_session(&responses, TIMEOUT).await;

        let requested = ids(&[1]);
        let stream = session.fetch(&requested, FetchOptions::default()).await.unwrap();
        let err = aggregate(stream, &requested).await.unwrap_err();
        assert!(matches!(err, MailError::Fetch(ref m) if m.contains("unexpected message 1")), "{err:?}");
    }

    #[tokio::test]
    async fn unrequested_message_is_a_fetch_error() {
        let mut responses = fetch_line(4, &message("four"));
        responses.push_str("A0003 OK FETCH completed\r\n");
        let (mut session, _server) = duplex_session(&responses, TIMEOUT).await;

        let requested = ids(&[3]);
        let stream = session.fetch(&requested, FetchOptions::default()).await.unwrap();
        let err = aggregate(stream, &requested).await.unwrap_err();
        assert!(matches!(err, MailError::Fetch(ref m) if m.contains("unexpected message 4")), "{err:?}");
    }

    #[tokio::test]
    async fn decode_failure_does_not_wait_for_the_next_message() {
        // Message 2 never arrives and the read timeout is long; the failure
        // of message 1 must still end aggregation.
        let responses = fetch_line(1, "\r\nnot a message");
        let (mut session, _server) = duplex_session(&responses, Duration::from_secs(300)).await;

        let requested = ids(&[1, 2]);
        let stream = session.fetch(&requested, FetchOptions::default()).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(10), aggregate(stream, &requested))
            .await
            .expect("aggregation kept waiting on the stream");
        assert!(matches!(outcome, Err(MailError::Decode(_))), "{outcome:?}");
        assert_eq!(session.state(), SessionState::Errored);
    }
}
