//! Outbound dispatch against a scripted SMTP relay on a local socket.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use base64::Engine;
use ticketmail_core::config::{Config, Security, SmtpSettings};
use ticketmail_core::mail::NOTIFICATION_SIGNATURE;
use ticketmail_core::model::DispatchStatus;
use ticketmail_core::store::MailLog;
use ticketmail_core::{Dispatcher, MailEvent, SqliteStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the relay saw.
#[derive(Debug, Default)]
struct Transcript {
    commands: Vec<String>,
    data: String,
}

/// Serves one SMTP conversation. `RCPT TO` for `reject` gets a 550.
async fn relay(reject: Option<&'static str>) -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut transcript = Transcript::default();

        write.write_all(b"220 relay.test ESMTP ready\r\n").await.unwrap();
        while let Some(line) = lines.next_line().await.unwrap() {
            transcript.commands.push(line.clone());
            let verb = line.split([' ', ':']).next().unwrap_or_default().to_ascii_uppercase();
            let reply: &[u8] = match verb.as_str() {
                "EHLO" => b"250-relay.test\r\n250-8BITMIME\r\n250 AUTH PLAIN LOGIN\r\n",
                "AUTH" => b"235 2.7.0 Authentication successful\r\n",
                "MAIL" => b"250 2.1.0 Ok\r\n",
                "RCPT" if reject.is_some_and(|address| line.contains(address)) => {
                    b"550 5.1.1 Mailbox unavailable\r\n"
                }
                "RCPT" => b"250 2.1.5 Ok\r\n",
                "DATA" => {
                    write.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await.unwrap();
                    while let Some(data) = lines.next_line().await.unwrap() {
                        if data == "." {
                            break;
                        }
                        transcript.data.push_str(&data);
                        transcript.data.push('\n');
                    }
                    b"250 2.0.0 Queued\r\n"
                }
                "QUIT" => {
                    write.write_all(b"221 2.0.0 Bye\r\n").await.unwrap();
                    break;
                }
                _ => b"502 5.5.2 Command not recognized\r\n",
            };
            write.write_all(reply).await.unwrap();
        }
        transcript
    });

    (port, handle)
}

fn config(port: u16) -> Config {
    Config {
        smtp: SmtpSettings {
            host: "127.0.0.1".into(),
            port,
            security: Security::None,
            username: "desk".into(),
            password: "secret".into(),
            from_address: "desk@example.com".into(),
            from_name: Some("Thesis Desk".into()),
            notification_recipients: vec!["staff@example.com".into()],
            accept_invalid_certs: false,
        },
        ..Config::default()
    }
}

fn reply_event(recipients: &[&str]) -> MailEvent {
    MailEvent::TicketReply {
        ticket_code: "AB12CD".into(),
        title: "Chapter 2".into(),
        author_name: "Dana".into(),
        body: "Looks good to me.".into(),
        recipients: recipients.iter().map(ToString::to_string).collect(),
    }
}

async fn dispatcher(config: Config) -> (Dispatcher, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let log: Arc<dyn MailLog> = store.clone();
    (Dispatcher::smtp(Arc::new(config), log), store)
}

#[tokio::test]
async fn reply_notification_is_delivered_and_logged() {
    let (port, server) = relay(None).await;
    let (dispatcher, store) = dispatcher(config(port)).await;

    let outcome = dispatcher
        .dispatch(&reply_event(&["Client@Example.com", "client@example.com", "not an address"]))
        .await;
    assert!(outcome.is_sent(), "{outcome:?}");
    assert_eq!(outcome.error, None);

    let transcript = server.await.unwrap();
    let credentials = base64::engine::general_purpose::STANDARD.encode("\0desk\0secret");
    assert_eq!(
        transcript.commands,
        vec![
            "EHLO example.com".to_string(),
            format!("AUTH PLAIN {credentials}"),
            "MAIL FROM:<desk@example.com> BODY=8BITMIME".to_string(),
            "RCPT TO:<client@example.com>".to_string(),
            "DATA".to_string(),
            "QUIT".to_string(),
        ]
    );
    assert!(transcript.data.contains("Subject: [Ticket #AB12CD] New reply: Chapter 2"));
    assert!(transcript.data.contains("Reply-To: desk@example.com"));
    assert!(transcript.data.contains(NOTIFICATION_SIGNATURE));
    assert!(transcript.data.contains("Dana replied:"));
    assert!(transcript.data.contains("http://localhost:8080/tickets/AB12CD"));

    let log = store.recent_mail_log(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event, "ticket_reply");
    assert_eq!(log[0].status, DispatchStatus::Sent);
    assert_eq!(log[0].recipients, vec!["client@example.com"]);
    assert_eq!(log[0].error, None);
}

#[tokio::test]
async fn malformed_recipient_does_not_block_valid_one() {
    let (port, server) = relay(None).await;
    let (dispatcher, store) = dispatcher(config(port)).await;

    let outcome = dispatcher
        .dispatch(&reply_event(&["client@example.com", "a@b@example.com", "tab\t@example.com"]))
        .await;
    assert!(outcome.is_sent(), "{outcome:?}");

    let transcript = server.await.unwrap();
    let rcpts: Vec<&str> = transcript
        .commands
        .iter()
        .map(String::as_str)
        .filter(|command| command.starts_with("RCPT"))
        .collect();
    assert_eq!(rcpts, vec!["RCPT TO:<client@example.com>"]);

    let log = store.recent_mail_log(10).await.unwrap();
    assert_eq!(log[0].status, DispatchStatus::Sent);
    assert_eq!(log[0].recipients, vec!["client@example.com"]);
}

#[tokio::test]
async fn rejected_recipient_is_logged_as_error() {
    let (port, server) = relay(Some("client@example.com")).await;
    let (dispatcher, store) = dispatcher(config(port)).await;

    let outcome = dispatcher.dispatch(&reply_event(&["client@example.com"])).await;
    assert_eq!(outcome.status, DispatchStatus::Error);
    assert!(outcome.error.as_deref().unwrap().contains("550"));

    let transcript = server.await.unwrap();
    assert!(!transcript.commands.iter().any(|command| command == "DATA"));
    assert_eq!(transcript.commands.last().map(String::as_str), Some("QUIT"));

    let log = store.recent_mail_log(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, DispatchStatus::Error);
    assert_eq!(log[0].error, outcome.error);
}

#[tokio::test]
async fn unconfigured_transport_is_skipped_without_connecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut config = config(port);
    config.smtp.password.clear();
    let (dispatcher, store) = dispatcher(config).await;

    let outcome = dispatcher.dispatch(&reply_event(&["client@example.com"])).await;
    assert_eq!(outcome.status, DispatchStatus::Skipped);
    assert_eq!(outcome.error.as_deref(), Some("mail transport not configured"));

    let accepted = tokio::time::timeout(std::time::Duration::from_millis(50), listener.accept()).await;
    assert!(accepted.is_err(), "no connection should be attempted");

    let log = store.recent_mail_log(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, DispatchStatus::Skipped);
    assert_eq!(log[0].subject, "[Ticket #AB12CD] New reply: Chapter 2");
}

#[tokio::test]
async fn spawned_dispatch_without_recipients_is_skipped() {
    let (dispatcher, store) = dispatcher(config(25)).await;

    let outcome = dispatcher
        .spawn(reply_event(&["nobody", ""]))
        .await
        .unwrap();
    assert_eq!(outcome.status, DispatchStatus::Skipped);
    assert_eq!(outcome.error.as_deref(), Some("no valid recipients"));
    assert_eq!(store.recent_mail_log(10).await.unwrap().len(), 1);
}
