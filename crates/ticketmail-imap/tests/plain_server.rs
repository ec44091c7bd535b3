//! Drives the client against a scripted server on a local TCP socket.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::NaiveDate;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use ticketmail_imap::{Config, SearchCriteria, Security, connect};

const MESSAGE: &str = "Subject: [Ticket #AB12CD] Need help\r\n\r\nHello\r\n";

/// Answers each expected command with the scripted reply.
async fn serve(listener: TcpListener, script: Vec<(&'static str, String)>) {
    let (socket, _) = listener.accept().await.unwrap();
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"* OK test server ready\r\n").await.unwrap();
    for (expected, reply) in script {
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, expected);
        write_half.write_all(reply.as_bytes()).await.unwrap();
    }
}

#[tokio::test]
async fn full_session_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let fetch_reply = format!(
        "* 1 FETCH (UID 41 INTERNALDATE \"05-Mar-2024 08:00:00 +0000\" FLAGS () BODY[] {{{}}}\r\n{MESSAGE})\r\nA0003 OK done\r\n",
        MESSAGE.len()
    );
    let server = tokio::spawn(serve(
        listener,
        vec![
            ("A0000 LOGIN support pw", "A0000 OK logged in\r\n".into()),
            (
                "A0001 SELECT INBOX",
                "* 1 EXISTS\r\n* OK [UIDVALIDITY 77] ok\r\nA0001 OK [READ-WRITE] done\r\n".into(),
            ),
            (
                "A0002 UID SEARCH SINCE 1-Mar-2024",
                "* SEARCH 41\r\nA0002 OK done\r\n".into(),
            ),
            ("A0003 UID FETCH 41 (UID FLAGS INTERNALDATE BODY.PEEK[])", fetch_reply),
            ("A0004 UID STORE 41 +FLAGS.SILENT (\\Seen)", "A0004 OK done\r\n".into()),
            ("A0005 CLOSE", "A0005 OK done\r\n".into()),
            ("A0006 LOGOUT", "* BYE bye\r\nA0006 OK done\r\n".into()),
        ],
    ));

    let mut config = Config::new("127.0.0.1").security(Security::None).port(port);
    config.timeouts.io = Duration::from_secs(5);

    let client = connect(&config).await.unwrap();
    let client = client.login("support", "pw").await.unwrap();
    let (mut inbox, status) = client.select("INBOX").await.unwrap();
    assert_eq!(status.uid_validity, Some(77));

    let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let uids = inbox.uid_search(SearchCriteria::Since(since)).await.unwrap();
    assert_eq!(uids, [41]);

    let message = inbox.uid_fetch(41).await.unwrap().unwrap();
    assert_eq!(message.body, MESSAGE.as_bytes());

    inbox.mark_seen(41).await.unwrap();
    inbox.close().await.unwrap().logout().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_a_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config::new("127.0.0.1").security(Security::None).port(port);
    let err = connect(&config).await.unwrap_err();
    assert!(err.is_connection_failure(), "{err}");
}
