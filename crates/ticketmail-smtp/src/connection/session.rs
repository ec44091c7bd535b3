//! One SMTP conversation over a single socket.

use super::queue::ExpectationQueue;
use super::stream::{self, SmtpStream, TlsOptions};
use super::ServerInfo;
use crate::command::Command;
use crate::data;
use crate::error::{Error, Result};
use crate::parser::LineBuffer;
use crate::types::{AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use std::collections::HashSet;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 4096;

/// Connect, greeting and idle-socket limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect (and implicit TLS handshake).
    pub connect: Duration,
    /// Wait for the 220 greeting.
    pub greeting: Duration,
    /// Wait for any further reply data.
    pub socket: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            greeting: Duration::from_secs(30),
            socket: Duration::from_secs(60),
        }
    }
}

/// Options for opening a [`Session`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Timeouts applied by the session.
    pub timeouts: Timeouts,
    /// TLS settings for implicit TLS and STARTTLS.
    pub tls: TlsOptions,
}

/// An SMTP protocol session.
///
/// Every request registers an expectation in a FIFO queue before its bytes
/// are written; replies read from the socket settle the oldest expectation.
/// When the socket fails, closes or times out, every pending request is
/// rejected and the session drops the connection.
#[derive(Debug)]
pub struct Session<S = SmtpStream> {
    stream: Option<S>,
    buffer: LineBuffer,
    queue: ExpectationQueue,
    server_info: ServerInfo,
    options: SessionOptions,
}

impl Session<SmtpStream> {
    /// Opens a TCP connection, wrapped in TLS right away when `secure`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or TLS handshake fails or times out.
    pub async fn open(
        hostname: &str,
        port: u16,
        secure: bool,
        options: &SessionOptions,
    ) -> Result<Self> {
        tracing::debug!(hostname, port, secure, "Opening SMTP connection");
        let stream = if secure {
            stream::connect_tls(hostname, port, options.timeouts.connect, options.tls).await?
        } else {
            stream::connect(hostname, port, options.timeouts.connect).await?
        };
        Ok(Self::new(stream, *options))
    }

    /// Performs the TLS handshake on the existing socket.
    ///
    /// The expectation queue survives the upgrade. Advertised extensions are
    /// forgotten, so EHLO must be sent again afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if plaintext data is still buffered, the session is
    /// closed, or the handshake fails. A failed handshake closes the session.
    pub async fn upgrade_to_tls(&mut self, hostname: &str) -> Result<()> {
        if !self.buffer.is_empty() || self.queue.backlog_len() > 0 {
            return Err(Error::Protocol(
                "Unexpected plaintext data before TLS handshake".into(),
            ));
        }

        let plain = self.stream.take().ok_or_else(closed_error)?;
        match plain.upgrade_to_tls(hostname, self.options.tls).await {
            Ok(tls) => {
                self.stream = Some(tls);
                self.server_info.extensions.clear();
                tracing::debug!(hostname, "SMTP connection upgraded to TLS");
                Ok(())
            }
            Err(err) => {
                self.queue.reject_all(closed_error);
                Err(err)
            }
        }
    }

    /// Sends STARTTLS and upgrades the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised, is rejected, or the
    /// handshake fails.
    pub async fn starttls(&mut self, hostname: &str) -> Result<()> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        self.execute(&Command::StartTls, &[ReplyCode::SERVICE_READY.as_u16()])
            .await?;
        self.upgrade_to_tls(hostname).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    #[must_use]
    pub fn new(stream: S, options: SessionOptions) -> Self {
        Self {
            stream: Some(stream),
            buffer: LineBuffer::new(),
            queue: ExpectationQueue::new(),
            server_info: ServerInfo::default(),
            options,
        }
    }

    /// Returns what the server advertised so far.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true until the connection has been dropped.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Waits for the 220 greeting and records the server hostname.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing, late or not 220.
    pub async fn greeting(&mut self) -> Result<Reply> {
        let limit = self.options.timeouts.greeting;
        let reply = self
            .request(
                "<greeting>".into(),
                None,
                &[ReplyCode::SERVICE_READY.as_u16()],
                limit,
            )
            .await?;

        self.server_info.hostname = reply
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        Ok(reply)
    }

    /// Writes `line` followed by CRLF (or nothing, to just wait) and waits
    /// for the next reply, which must carry one of `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedReply`] for a code outside `expected`, or a
    /// connection error if the socket fails before the reply is complete.
    pub async fn command(&mut self, line: Option<&str>, expected: &[u16]) -> Result<Reply> {
        let limit = self.options.timeouts.socket;
        match line {
            Some(line) => {
                let wire = format!("{line}\r\n").into_bytes();
                self.request(line.to_string(), Some(wire), expected, limit)
                    .await
            }
            None => self.request("<wait>".into(), None, expected, limit).await,
        }
    }

    /// Sends a typed command. Credentials never appear in logs or errors.
    ///
    /// # Errors
    ///
    /// Same as [`Session::command`].
    pub async fn execute(&mut self, command: &Command, expected: &[u16]) -> Result<Reply> {
        let wire = format!("{}\r\n", command.serialize()).into_bytes();
        let limit = self.options.timeouts.socket;
        self.request(command.redacted(), Some(wire), expected, limit)
            .await
    }

    /// Sends EHLO and records the advertised extensions, falling back to
    /// HELO when the server does not understand EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if both greetings are rejected.
    pub async fn hello(&mut self, client_hostname: &str) -> Result<&ServerInfo> {
        let ehlo = Command::Ehlo {
            hostname: client_hostname.to_string(),
        };
        let extensions = match self.execute(&ehlo, &[ReplyCode::OK.as_u16()]).await {
            Ok(reply) => reply
                .message
                .iter()
                .skip(1)
                .map(|line| Extension::parse(line))
                .collect(),
            Err(Error::UnexpectedReply { code, .. })
                if code == ReplyCode::SYNTAX_ERROR.as_u16()
                    || code == ReplyCode::NOT_IMPLEMENTED.as_u16() =>
            {
                tracing::debug!(code, "EHLO refused, falling back to HELO");
                let helo = Command::Helo {
                    hostname: client_hostname.to_string(),
                };
                self.execute(&helo, &[ReplyCode::OK.as_u16()]).await?;
                HashSet::new()
            }
            Err(err) => return Err(err),
        };

        self.server_info.extensions = extensions;
        Ok(&self.server_info)
    }

    /// Authenticates with AUTH PLAIN when advertised, AUTH LOGIN otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the credentials.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let mechanisms = self.server_info.auth_mechanisms();
        let use_login =
            mechanisms.contains(&AuthMechanism::Login) && !mechanisms.contains(&AuthMechanism::Plain);

        if use_login {
            let start = Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            };
            let cont = ReplyCode::AUTH_CONTINUE.as_u16();
            self.execute(&start, &[cont]).await?;
            self.execute(&Command::AuthResponse(engine.encode(username)), &[cont])
                .await?;
            self.execute(
                &Command::AuthResponse(engine.encode(password)),
                &[ReplyCode::AUTH_SUCCESS.as_u16()],
            )
            .await?;
        } else {
            let credentials = format!("\0{username}\0{password}");
            let command = Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(engine.encode(credentials.as_bytes())),
            };
            self.execute(&command, &[ReplyCode::AUTH_SUCCESS.as_u16()])
                .await?;
        }

        tracing::debug!(username, "SMTP authentication succeeded");
        Ok(())
    }

    /// Transmits a message body after a 354 reply, dot-stuffed and terminated
    /// by a lone `.` line, and waits for 250.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not accept the message.
    pub async fn send_data(&mut self, payload: &[u8]) -> Result<Reply> {
        let wire = data::encode(payload);
        let limit = self.options.timeouts.socket;
        self.request(
            "<message body>".into(),
            Some(wire),
            &[ReplyCode::OK.as_u16()],
            limit,
        )
        .await
    }

    /// Sends QUIT and shuts the socket down. Errors are ignored, so this is
    /// safe to call after any outcome.
    pub async fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }

        if let Err(err) = self
            .execute(&Command::Quit, &[ReplyCode::CLOSING.as_u16()])
            .await
        {
            tracing::debug!(error = %err, "QUIT failed");
        }
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.queue.reject_all(closed_error);
    }

    async fn request(
        &mut self,
        label: String,
        wire: Option<Vec<u8>>,
        expected: &[u16],
        limit: Duration,
    ) -> Result<Reply> {
        if self.stream.is_none() {
            return Err(closed_error());
        }

        if wire.is_some() {
            tracing::debug!("C: {label}");
        }
        let mut receiver = self.queue.enqueue(label, expected);
        if let Some(bytes) = wire {
            self.write(&bytes).await?;
        }

        self.pump(limit).await;
        receiver.try_recv().unwrap_or_else(|_| Err(dropped_error()))
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let limit = self.options.timeouts.socket;
        let Some(stream) = self.stream.as_mut() else {
            return Err(closed_error());
        };

        let outcome = tokio::time::timeout(limit, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                let (kind, text) = (err.kind(), err.to_string());
                self.fail(|| Error::Io(io::Error::new(kind, text.clone())));
                Err(Error::Io(err))
            }
            Err(_) => {
                self.fail(|| Error::Timeout(limit));
                Err(Error::Timeout(limit))
            }
        }
    }

    /// Reads until no request is pending. Failures settle every pending
    /// request and drop the connection.
    async fn pump(&mut self, limit: Duration) {
        let mut chunk = [0u8; READ_CHUNK];
        while self.queue.has_pending() {
            let Some(stream) = self.stream.as_mut() else {
                self.queue.reject_all(closed_error);
                return;
            };

            match tokio::time::timeout(limit, stream.read(&mut chunk)).await {
                Err(_) => {
                    tracing::warn!(?limit, "SMTP server did not reply in time");
                    self.fail(|| Error::Timeout(limit));
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "SMTP socket error");
                    let (kind, text) = (err.kind(), err.to_string());
                    self.fail(|| Error::Io(io::Error::new(kind, text.clone())));
                }
                Ok(Ok(0)) => {
                    self.fail(|| Error::ConnectionClosed("server closed the connection".into()));
                }
                Ok(Ok(n)) => match self.buffer.push(&chunk[..n]) {
                    Ok(lines) => {
                        for line in lines {
                            tracing::debug!("S: {line}");
                            self.queue.push_line(line);
                        }
                    }
                    Err(err) => {
                        let text = err.to_string();
                        self.fail(|| Error::Protocol(text.clone()));
                    }
                },
            }
        }
    }

    fn fail(&mut self, make_error: impl Fn() -> Error) {
        self.queue.reject_all(make_error);
        self.stream = None;
    }
}

fn closed_error() -> Error {
    Error::ConnectionClosed("session is closed".into())
}

fn dropped_error() -> Error {
    Error::Protocol("reply was never delivered".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn session<S: AsyncRead + AsyncWrite + Unpin>(stream: S) -> Session<S> {
        Session::new(stream, SessionOptions::default())
    }

    #[tokio::test]
    async fn greeting_and_ehlo_record_extensions() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP ready\r\n")
            .write(b"EHLO client.local\r\n")
            .read(b"250-smtp.example.com\r\n250-STARTTLS\r\n")
            .read(b"250-AUTH PLAIN LOGIN\r\n250 SIZE 1000\r\n")
            .build();
        let mut session = session(mock);

        session.greeting().await.unwrap();
        assert_eq!(session.server_info().hostname, "smtp.example.com");

        let info = session.hello("client.local").await.unwrap();
        assert!(info.supports_starttls());
        assert_eq!(info.max_message_size(), Some(1000));
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::Plain, AuthMechanism::Login]
        );
    }

    #[tokio::test]
    async fn ehlo_falls_back_to_helo() {
        let mock = Builder::new()
            .write(b"EHLO client.local\r\n")
            .read(b"502 command not implemented\r\n")
            .write(b"HELO client.local\r\n")
            .read(b"250 hello\r\n")
            .build();
        let mut session = session(mock);

        let info = session.hello("client.local").await.unwrap();
        assert!(info.extensions.is_empty());
    }

    #[tokio::test]
    async fn unexpected_reply_carries_raw_line() {
        let mock = Builder::new()
            .write(b"MAIL FROM:<a@example.com>\r\n")
            .read(b"550 5.7.1 relaying denied\r\n")
            .build();
        let mut session = session(mock);

        let err = session
            .command(Some("MAIL FROM:<a@example.com>"), &[250])
            .await
            .unwrap_err();
        match err {
            Error::UnexpectedReply {
                command,
                code,
                line,
                ..
            } => {
                assert_eq!(command, "MAIL FROM:<a@example.com>");
                assert_eq!(code, 550);
                assert_eq!(line, "550 5.7.1 relaying denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn auth_plain_sends_initial_response() {
        let mock = Builder::new()
            .write(b"EHLO c\r\n")
            .read(b"250-mx\r\n250 AUTH LOGIN PLAIN\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 2.7.0 accepted\r\n")
            .build();
        let mut session = session(mock);

        session.hello("c").await.unwrap();
        session.authenticate("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn auth_login_when_plain_missing() {
        let mock = Builder::new()
            .write(b"EHLO c\r\n")
            .read(b"250-mx\r\n250 AUTH LOGIN\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .build();
        let mut session = session(mock);

        session.hello("c").await.unwrap();
        session.authenticate("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn auth_failure_does_not_leak_credentials() {
        let mock = Builder::new()
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"535 bad credentials\r\n")
            .build();
        let mut session = session(mock);

        let err = session.authenticate("user", "pass").await.unwrap_err();
        assert!(!err.to_string().contains("AHVzZXIAcGFzcw=="));
        assert_eq!(err.reply_code(), Some(535));
    }

    #[tokio::test]
    async fn send_data_dot_stuffs_body() {
        let mock = Builder::new()
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: x\r\n\r\n..hidden\r\n.\r\n")
            .read(b"250 queued as 1234\r\n")
            .build();
        let mut session = session(mock);

        session.command(Some("DATA"), &[354]).await.unwrap();
        let reply = session
            .send_data(b"Subject: x\r\n\r\n.hidden\r\n")
            .await
            .unwrap();
        assert_eq!(reply.message_text(), "queued as 1234");
    }

    #[tokio::test]
    async fn extra_reply_lines_become_backlog_for_next_command() {
        let mock = Builder::new()
            .read(b"220 mx ready\r\n250 stray\r\n")
            .write(b"NOOP\r\n")
            .build();
        let mut session = session(mock);

        session.greeting().await.unwrap();
        let reply = session.command(Some("NOOP"), &[250]).await.unwrap();
        assert_eq!(reply.message_text(), "stray");
    }

    #[tokio::test]
    async fn eof_rejects_pending_request() {
        let mock = Builder::new()
            .write(b"NOOP\r\n")
            .read(b"250-partial\r\n")
            .build();
        let mut session = session(mock);

        let err = session.command(Some("NOOP"), &[250]).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed(_)));
        assert!(err.is_connection_failure());
        assert!(!session.is_open());

        let again = session.command(Some("NOOP"), &[250]).await.unwrap_err();
        assert!(matches!(again, Error::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn socket_error_rejects_pending_request() {
        let mock = Builder::new()
            .write(b"NOOP\r\n")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let mut session = session(mock);

        let err = session.command(Some("NOOP"), &[250]).await.unwrap_err();
        assert!(err.is_connection_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut session = session(client);

        let err = session.greeting().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(limit) if limit == Timeouts::default().greeting));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn close_sends_quit_and_tolerates_failure() {
        let mock = Builder::new()
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();
        let mut session = session(mock);
        session.close().await;
        assert!(!session.is_open());

        // Closing twice is a no-op.
        session.close().await;
    }
}
