//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::parser::{ResponseCode, UntaggedResponse};
use crate::types::MailboxStatus;

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox does not exist or the connection
    /// fails. The client is consumed either way.
    pub async fn select(mut self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let responses = self
            .execute(&Command::Select {
                mailbox: mailbox.to_string(),
            })
            .await?;

        let mut status = MailboxStatus {
            name: mailbox.to_string(),
            ..MailboxStatus::default()
        };
        for response in responses {
            match response {
                UntaggedResponse::Exists(n) => status.exists = n,
                UntaggedResponse::Condition {
                    code: Some(ResponseCode::UidValidity(v)),
                    ..
                } => status.uid_validity = Some(v),
                UntaggedResponse::Condition {
                    code: Some(ResponseCode::UidNext(n)),
                    ..
                } => status.uid_next = Some(n),
                _ => {}
            }
        }

        tracing::debug!(
            mailbox,
            exists = status.exists,
            uid_validity = ?status.uid_validity,
            "mailbox selected"
        );
        Ok((self.transition(), status))
    }
}
