//! Type-state IMAP client connection.
//!
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN
//! - `Selected`: after SELECT
//!
//! Each state only exposes the commands valid in it. Every command is
//! written with a fresh tag and completes when the tagged response arrives.
//! The I/O timeout bounds each socket read, so a large FETCH that keeps
//! streaming is not cut off while a silent server still is.

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseCode, Status, UntaggedResponse, parse_response};
use crate::{Error, Result};

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tag_gen: TagGenerator,
    capabilities: Vec<String>,
    io_timeout: Duration,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            _state: PhantomData,
        }
    }

    /// Returns the capabilities the server last advertised.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Checks for a capability, ignoring case.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|cap| cap.eq_ignore_ascii_case(name))
    }

    /// Sends NOOP, keeping the connection alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the command or the connection
    /// fails.
    pub async fn noop(&mut self) -> Result<()> {
        self.execute(&Command::Noop).await.map(drop)
    }

    /// Refreshes the capability list.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn capability(&mut self) -> Result<&[String]> {
        self.execute(&Command::Capability).await?;
        Ok(&self.capabilities)
    }

    /// Logs out and shuts the connection down.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not complete LOGOUT.
    pub async fn logout(mut self) -> Result<()> {
        let result = self.execute(&Command::Logout).await.map(drop);
        let _ = self.stream.shutdown().await;
        result
    }

    /// Runs one tagged command and returns its untagged responses.
    ///
    /// Capability data seen along the way refreshes the stored list.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        let tag = self.tag_gen.next();
        tracing::debug!(command = %command.redacted(&tag), "IMAP >");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let raw = self.stream.read_until_tagged(&tag).await?;

        let mut untagged = Vec::with_capacity(raw.len());
        let mut completion = None;
        for bytes in &raw {
            match parse_response(bytes) {
                Ok(Response::Tagged {
                    tag: resp_tag,
                    status,
                    code,
                    text,
                }) if resp_tag == tag => {
                    if let Some(ResponseCode::Capability(caps)) = code {
                        self.capabilities = caps;
                    }
                    completion = Some((status, text));
                }
                Ok(Response::Untagged(response)) => {
                    self.absorb_capabilities(&response);
                    untagged.push(response);
                }
                Ok(other) => tracing::debug!(?other, "IMAP < ignored"),
                Err(err) => tracing::debug!(
                    %err,
                    line = %String::from_utf8_lossy(bytes).trim_end(),
                    "IMAP < unparsed"
                ),
            }
        }

        match completion {
            Some((Status::Ok, _)) => Ok(untagged),
            Some((Status::No, text)) => Err(Error::No(text)),
            Some((Status::Bye, text)) => Err(Error::Bye(text)),
            Some((_, text)) => Err(Error::Bad(text)),
            None => Err(Error::Protocol(format!("malformed completion for {tag}"))),
        }
    }

    fn absorb_capabilities(&mut self, response: &UntaggedResponse) {
        match response {
            UntaggedResponse::Capability(caps)
            | UntaggedResponse::Condition {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => self.capabilities.clone_from(caps),
            _ => {}
        }
    }
}
