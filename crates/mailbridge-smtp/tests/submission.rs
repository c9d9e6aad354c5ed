//! End-to-end submission against a scripted server on a local socket.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use mailbridge_smtp::{Address, Config, Credentials, Envelope, Error, Security, send};

/// Accepts one connection and plays `script`: each entry is the line the
/// client must send (`None` for the greeting) and the server's answer.
async fn serve(listener: TcpListener, script: Vec<(Option<&'static str>, &'static str)>) -> Vec<String> {
    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut read = BufReader::new(read);
    let mut seen = Vec::new();

    for (expect, answer) in script {
        if let Some(expect) = expect {
            let mut line = String::new();
            read.read_line(&mut line).await.unwrap();
            assert_eq!(line, format!("{expect}\r\n"));
            seen.push(line);
            if expect == "DATA" {
                write.write_all(answer.as_bytes()).await.unwrap();
                let mut body = String::new();
                loop {
                    let mut line = String::new();
                    read.read_line(&mut line).await.unwrap();
                    if line == ".\r\n" {
                        break;
                    }
                    body.push_str(&line);
                }
                seen.push(body);
                continue;
            }
        }
        write.write_all(answer.as_bytes()).await.unwrap();
    }
    seen
}

fn envelope() -> Envelope {
    Envelope::new(
        Address::new("me@example.com").unwrap(),
        [Address::new("u@v.com").unwrap()],
    )
    .unwrap()
}

#[tokio::test]
async fn plain_submission() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(serve(
        listener,
        vec![
            (None, "220 localhost ESMTP test\r\n"),
            (Some("EHLO localhost"), "250-localhost\r\n250-8BITMIME\r\n250 AUTH PLAIN\r\n"),
            (Some("AUTH PLAIN AHVzZXIAcGFzcw=="), "235 ok\r\n"),
            (Some("MAIL FROM:<me@example.com> BODY=8BITMIME"), "250 ok\r\n"),
            (Some("RCPT TO:<u@v.com>"), "250 ok\r\n"),
            (Some("DATA"), "354 go\r\n"),
            (None, "250 queued as 1\r\n"),
            (Some("QUIT"), "221 bye\r\n"),
        ],
    ));

    let config = Config::builder("127.0.0.1")
        .port(port)
        .io_timeout(Duration::from_secs(5))
        .build();
    send(
        &config,
        Some(&Credentials::new("user", "pass")),
        &envelope(),
        b"Subject: S\r\n\r\n.T\r\n",
    )
    .await
    .unwrap();

    let seen = server.await.unwrap();
    assert!(seen.contains(&"Subject: S\r\n\r\n..T\r\n".to_string()));
}

#[tokio::test]
async fn starttls_required_but_not_offered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(serve(
        listener,
        vec![
            (None, "220 localhost ESMTP test\r\n"),
            (Some("EHLO localhost"), "250-localhost\r\n250 AUTH PLAIN\r\n"),
        ],
    ));

    let config = Config::builder("127.0.0.1")
        .port(port)
        .security(Security::StartTls)
        .build();
    let err = send(&config, None, &envelope(), b"x").await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(ref what) if what == "STARTTLS"));
    server.await.unwrap();
}
