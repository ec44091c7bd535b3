//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::{Command, SearchCriteria};
use crate::parser::UntaggedResponse;
use crate::types::FetchedMessage;

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Searches the selected mailbox, returning UIDs in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn uid_search(&mut self, criteria: SearchCriteria) -> Result<Vec<u32>> {
        let responses = self.execute(&Command::UidSearch(criteria)).await?;
        let mut uids: Vec<u32> = responses
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Fetches one whole message without setting `\Seen`.
    ///
    /// Returns `None` if the UID no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub async fn uid_fetch(&mut self, uid: u32) -> Result<Option<FetchedMessage>> {
        let responses = self.execute(&Command::UidFetch { uid }).await?;

        // Unsolicited FETCH data for other messages may be interleaved.
        Ok(responses.into_iter().find_map(|response| match response {
            UntaggedResponse::Fetch { data, .. } if data.uid == Some(uid) => {
                data.body.map(|body| FetchedMessage {
                    uid,
                    flags: data.flags,
                    internal_date: data.internal_date,
                    body,
                })
            }
            _ => None,
        }))
    }

    /// Adds flags to a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn uid_add_flags(&mut self, uid: u32, flags: &[&str]) -> Result<()> {
        self.execute(&Command::UidStore {
            uid,
            flags: flags.iter().map(ToString::to_string).collect(),
        })
        .await
        .map(drop)
    }

    /// Marks a message as read.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.uid_add_flags(uid, &["\\Seen"]).await
    }

    /// Closes the mailbox and returns to the authenticated state.
    ///
    /// # Errors
    ///
    /// Returns an error if CLOSE fails.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Close).await?;
        Ok(self.transition())
    }
}
