//! Session tests against scripted IMAP servers.
//!
//! Conversations are scripted with `tokio_test::io::Builder`, which fails the
//! test if the client writes anything other than the expected commands.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_test::io::{Builder, Mock};

use mailbridge_imap::{
    Credentials, Error, FetchOptions, SearchCriteria, SeqNum, Session, SessionState,
};

const TIMEOUT: Duration = Duration::from_secs(30);

fn credentials() -> Credentials {
    Credentials::new("alice@example.com", "app-password")
}

/// Greeting, login, SELECT INBOX and SEARCH UNSEEN returning `search`.
fn opening(builder: &mut Builder, search: &[u8]) {
    builder
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Dovecot ready.\r\n")
        .write(b"A0001 LOGIN alice@example.com app-password\r\n")
        .read(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
        .read(b"* 4 EXISTS\r\n* 0 RECENT\r\n")
        .read(b"* OK [UNSEEN 1] First unseen.\r\n")
        .read(b"A0002 OK [READ-WRITE] Select completed.\r\n")
        .write(b"A0003 SEARCH UNSEEN\r\n")
        .read(search)
        .read(b"A0003 OK Search completed.\r\n");
}

fn logout(builder: &mut Builder, tag: &str) {
    builder
        .write(format!("{tag} LOGOUT\r\n").as_bytes())
        .read(b"* BYE Logging out\r\n")
        .read(format!("{tag} OK Logout completed.\r\n").as_bytes());
}

async fn open(mock: Mock) -> Session<Mock> {
    let mut session = Session::new(TIMEOUT);
    session.connect_with(mock, &credentials()).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    session
}

fn seq(n: u32) -> SeqNum {
    SeqNum::new(n).unwrap()
}

#[tokio::test]
async fn full_retrieval_conversation() {
    let mut builder = Builder::new();
    opening(&mut builder, b"* SEARCH 1 3 4\r\n");
    builder
        .write(b"A0004 FETCH 3:4 (BODY[])\r\n")
        .read(b"* 3 FETCH (BODY[] {25}\r\nSubject: first\r\n\r\nHello\r\n)\r\n")
        .read(b"* 4 FETCH (FLAGS (\\Seen) BODY[] {26}\r\nSubject: second\r\n\r\nWorld\r\n)\r\n")
        .read(b"A0004 OK Fetch completed.\r\n");
    logout(&mut builder, "A0005");

    let mut session = open(builder.build()).await;

    assert_eq!(session.select_folder("INBOX").await.unwrap(), 4);
    assert_eq!(session.selected_folder(), Some("INBOX"));
    assert_eq!(session.state(), SessionState::FolderSelected);

    let ids = session.search(&SearchCriteria::Unseen).await.unwrap();
    assert_eq!(ids, vec![seq(1), seq(3), seq(4)]);
    assert_eq!(session.state(), SessionState::FolderSelected);

    let mut fetched = Vec::new();
    let mut stream = session
        .fetch(&ids[1..], FetchOptions::default())
        .await
        .unwrap();
    while let Some(item) = stream.next().await {
        fetched.push(item.unwrap());
    }
    assert!(stream.next().await.is_none());
    drop(stream);

    assert_eq!(session.state(), SessionState::FolderSelected);
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].0, seq(3));
    assert_eq!(fetched[0].1, b"Subject: first\r\n\r\nHello\r\n");
    assert_eq!(fetched[1].0, seq(4));
    assert_eq!(fetched[1].1, b"Subject: second\r\n\r\nWorld\r\n");

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.selected_folder(), None);

    // Second close is a no-op: the mock would reject another LOGOUT.
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn peek_fetch_leaves_flags_alone() {
    let mut builder = Builder::new();
    opening(&mut builder, b"* SEARCH 2\r\n");
    builder
        .write(b"A0004 FETCH 2 (BODY.PEEK[])\r\n")
        .read(b"* 2 FETCH (BODY[] {4}\r\nabcd)\r\n")
        .read(b"A0004 OK Fetch completed.\r\n");
    logout(&mut builder, "A0005");

    let mut session = open(builder.build()).await;
    session.select_folder("INBOX").await.unwrap();
    let ids = session.search(&SearchCriteria::Unseen).await.unwrap();

    let mut stream = session
        .fetch(&ids, FetchOptions { mark_seen: false })
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), (seq(2), b"abcd".to_vec()));
    assert!(stream.next().await.is_none());
    drop(stream);

    session.close().await;
}

#[tokio::test]
async fn empty_search_result() {
    let mut builder = Builder::new();
    opening(&mut builder, b"* SEARCH\r\n");
    logout(&mut builder, "A0004");

    let mut session = open(builder.build()).await;
    session.select_folder("INBOX").await.unwrap();

    assert!(session.search(&SearchCriteria::Unseen).await.unwrap().is_empty());
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn fetch_no_ends_stream_with_error() {
    let mut builder = Builder::new();
    opening(&mut builder, b"* SEARCH 1 2\r\n");
    builder
        .write(b"A0004 FETCH 1:2 (BODY[])\r\n")
        .read(b"* 1 FETCH (BODY[] {2}\r\nok)\r\n")
        .read(b"A0004 NO Some messages could not be fetched\r\n");
    logout(&mut builder, "A0005");

    let mut session = open(builder.build()).await;
    session.select_folder("INBOX").await.unwrap();
    let ids = session.search(&SearchCriteria::Unseen).await.unwrap();

    let mut stream = session.fetch(&ids, FetchOptions::default()).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::No(ref text) if text.contains("could not be fetched")));
    assert!(stream.next().await.is_none());
    drop(stream);

    assert_eq!(session.state(), SessionState::Errored);
    assert!(matches!(
        session.search(&SearchCriteria::Unseen).await,
        Err(Error::InvalidState(_))
    ));

    // A NO leaves the connection usable, so close still logs out.
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn select_failure_is_errored() {
    let mut builder = Builder::new();
    builder
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN alice@example.com app-password\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT Archive\r\n")
        .read(b"A0002 NO [NONEXISTENT] Mailbox doesn't exist: Archive\r\n");
    logout(&mut builder, "A0003");

    let mut session = open(builder.build()).await;

    let err = session.select_folder("Archive").await.unwrap_err();
    assert!(matches!(err, Error::No(_)));
    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(session.selected_folder(), None);

    session.close().await;
}

#[tokio::test]
async fn bye_greeting_fails_connect() {
    let mock = Builder::new()
        .read(b"* BYE Too many connections from your IP\r\n")
        .build();
    let mut session = Session::new(TIMEOUT);

    let err = session.connect_with(mock, &credentials()).await.unwrap_err();
    assert!(matches!(err, Error::Bye(_)));
    assert_eq!(session.state(), SessionState::Errored);

    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn connect_twice_is_rejected() {
    let mut builder = Builder::new();
    builder
        .read(b"* OK ready\r\n")
        .write(b"A0001 LOGIN alice@example.com app-password\r\n")
        .read(b"A0001 OK Logged in\r\n");
    logout(&mut builder, "A0002");

    let mut session = open(builder.build()).await;
    let err = session
        .connect_with(Builder::new().build(), &credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(session.state(), SessionState::Ready);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out() {
    let (client_side, mut server_side) = tokio::io::duplex(4096);
    server_side
        .write_all(b"* OK ready\r\nA0001 OK Logged in\r\nA0002 OK Selected\r\n")
        .await
        .unwrap();

    let mut session = Session::new(Duration::from_secs(10));
    session
        .connect_with(client_side, &credentials())
        .await
        .unwrap();
    session.select_folder("INBOX").await.unwrap();

    // The server never answers SEARCH.
    let err = session.search(&SearchCriteria::Unseen).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(10)));
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Errored);

    // The connection was dropped with the timeout, so close sends nothing.
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    drop(server_side);
}

#[tokio::test]
async fn server_hangup_mid_fetch() {
    let mut builder = Builder::new();
    opening(&mut builder, b"* SEARCH 5\r\n");
    builder
        .write(b"A0004 FETCH 5 (BODY[])\r\n")
        .read(b"* 5 FETCH (BODY[] {100}\r\ntruncated");

    let mut session = open(builder.build()).await;
    session.select_folder("INBOX").await.unwrap();
    let ids = session.search(&SearchCriteria::Unseen).await.unwrap();

    let mut stream = session.fetch(&ids, FetchOptions::default()).await.unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(stream.next().await.is_none());
    drop(stream);

    assert_eq!(session.state(), SessionState::Errored);
    session.close().await;
}
