//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::config::Timeouts;
use crate::connection::framed::FramedStream;
use crate::connection::stream::{ImapStream, TlsOptions};
use crate::parser::{Response, ResponseCode, Status, UntaggedResponse, parse_response};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream by reading the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bye`] if the server refuses the connection, or a
    /// timeout if no greeting arrives within `timeouts.greeting`.
    pub async fn from_stream(stream: S, timeouts: Timeouts) -> Result<Self> {
        let mut framed = FramedStream::new(stream).with_read_timeout(timeouts.io);

        let greeting = tokio::time::timeout(timeouts.greeting, framed.read_response())
            .await
            .map_err(|_| Error::Timeout(timeouts.greeting))??;

        let capabilities = match parse_response(&greeting)? {
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Ok | Status::PreAuth,
                code,
                ..
            }) => match code {
                Some(ResponseCode::Capability(caps)) => caps,
                _ => Vec::new(),
            },
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        };

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            io_timeout: timeouts.io,
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// Returns an error if the server advertises `LOGINDISABLED` or rejects
    /// the credentials.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        if self.has_capability("LOGINDISABLED") {
            return Err(Error::Protocol(
                "server disabled LOGIN on this connection".to_string(),
            ));
        }

        self.execute(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;

        Ok(self.transition())
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Negotiates STARTTLS and re-reads capabilities over the encrypted channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects STARTTLS, sent data after the
    /// go-ahead, or the handshake fails.
    pub async fn starttls(mut self, host: &str, options: TlsOptions) -> Result<Self> {
        self.execute(&Command::StartTls).await?;
        if self.stream.has_buffered_data() {
            return Err(Error::Protocol(
                "unexpected data after STARTTLS response".to_string(),
            ));
        }

        let upgraded = self.stream.into_inner().upgrade_to_tls(host, options).await?;
        let mut client = Self {
            stream: FramedStream::new(upgraded).with_read_timeout(self.io_timeout),
            tag_gen: self.tag_gen,
            capabilities: Vec::new(),
            io_timeout: self.io_timeout,
            _state: PhantomData,
        };
        client.capability().await?;
        Ok(client)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn greeting_capabilities_and_login() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Dovecot ready.\r\n")
            .write(b"A0000 LOGIN support@example.com secret\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1 UIDPLUS] Logged in\r\n")
            .build();

        let client = Client::from_stream(mock, Timeouts::default()).await.unwrap();
        assert!(client.has_capability("auth=plain"));

        let client = client.login("support@example.com", "secret").await.unwrap();
        assert!(client.has_capability("UIDPLUS"));
    }

    #[tokio::test]
    async fn bye_greeting() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock, Timeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn rejected_login() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user \"bad pass\"\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();

        let client = Client::from_stream(mock, Timeouts::default()).await.unwrap();
        let err = client.login("user", "bad pass").await.unwrap_err();
        assert!(matches!(err, Error::No(text) if text == "Invalid credentials"));
    }

    #[tokio::test]
    async fn login_disabled_is_not_attempted() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n")
            .build();

        let client = Client::from_stream(mock, Timeouts::default()).await.unwrap();
        assert!(client.login("user", "pass").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn greeting_timeout() {
        let (client_side, _server) = tokio::io::duplex(64);
        let timeouts = Timeouts {
            greeting: std::time::Duration::from_secs(5),
            ..Timeouts::default()
        };

        let err = Client::from_stream(client_side, timeouts).await.unwrap_err();
        assert!(err.is_connection_failure());
    }
}
