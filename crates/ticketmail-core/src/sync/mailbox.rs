//! The mailbox operations the sync engine needs, and their IMAP adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ticketmail_imap::{Authenticated, Client, ImapStream, SearchCriteria, Selected};
use tokio::time::Instant;
use tracing::debug;

use crate::config::{ImapSettings, SyncSettings};
use crate::{Error, Result};

/// A folder opened by [`Mailbox::lock_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Folder name.
    pub name: String,
    /// UIDVALIDITY, 0 if the server did not report one.
    pub uid_validity: u32,
    /// Number of messages in the folder.
    pub exists: u32,
}

/// One fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    /// Message UID.
    pub uid: u32,
    /// Server arrival time.
    pub internal_date: Option<DateTime<Utc>>,
    /// Whether `\Seen` was already set.
    pub seen: bool,
    /// Raw RFC 5322 bytes.
    pub raw: Vec<u8>,
}

/// Opens exclusive mailbox connections, one per run.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connects and authenticates.
    async fn connect(&self) -> Result<Box<dyn Mailbox>>;
}

/// An authenticated mailbox connection.
///
/// At most one folder is locked at a time; fetch and flag updates apply to
/// the locked folder.
#[async_trait]
pub trait Mailbox: Send {
    /// Opens `folder` read-write.
    async fn lock_folder(&mut self, folder: &str) -> Result<FolderInfo>;

    /// UIDs of messages that arrived on or after `since`, ascending.
    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>>;

    /// Fetches one message without setting `\Seen`.
    async fn fetch(&mut self, uid: u32) -> Result<Option<MailboxMessage>>;

    /// Sets `\Seen`.
    async fn mark_read(&mut self, uid: u32) -> Result<()>;

    /// Closes the locked folder. Does nothing if none is locked.
    async fn unlock_folder(&mut self) -> Result<()>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<()>;
}

/// Connects to the configured IMAP server.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    settings: ImapSettings,
    config: ticketmail_imap::Config,
    keepalive: Duration,
}

impl ImapConnector {
    /// Creates a connector from the mailbox and sync settings.
    #[must_use]
    pub fn new(settings: ImapSettings, sync: &SyncSettings) -> Self {
        let config = settings.connection_config(sync);
        Self {
            settings,
            config,
            keepalive: sync.keepalive_interval,
        }
    }

    async fn login(&self) -> Result<Client<ImapStream, Authenticated>> {
        let client = ticketmail_imap::connect(&self.config).await?;
        let client = client
            .login(&self.settings.username, &self.settings.password)
            .await?;
        debug!(host = %self.config.host, "IMAP session authenticated");
        Ok(client)
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn Mailbox>> {
        let client = self.login().await?;
        Ok(Box::new(ImapMailbox {
            connector: self.clone(),
            state: SessionState::Authenticated(client),
            last_activity: Instant::now(),
        }))
    }
}

enum SessionState {
    Authenticated(Client<ImapStream, Authenticated>),
    Selected(Client<ImapStream, Selected>),
    /// A failed SELECT or CLOSE consumed the client.
    Lost,
    LoggedOut,
}

/// [`Mailbox`] over a type-state IMAP client.
struct ImapMailbox {
    connector: ImapConnector,
    state: SessionState,
    last_activity: Instant,
}

impl ImapMailbox {
    /// Sends NOOP when the connection sat idle past the keepalive interval.
    async fn keepalive(&mut self) -> Result<()> {
        if self.last_activity.elapsed() < self.connector.keepalive {
            return Ok(());
        }
        debug!("IMAP connection idle, sending NOOP");
        match &mut self.state {
            SessionState::Authenticated(client) => client.noop().await?,
            SessionState::Selected(client) => client.noop().await?,
            SessionState::Lost | SessionState::LoggedOut => {}
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    async fn selected(&mut self) -> Result<&mut Client<ImapStream, Selected>> {
        self.keepalive().await?;
        self.touch();
        match &mut self.state {
            SessionState::Selected(client) => Ok(client),
            _ => Err(Error::NotConnected),
        }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn lock_folder(&mut self, folder: &str) -> Result<FolderInfo> {
        self.keepalive().await?;

        let client = match std::mem::replace(&mut self.state, SessionState::Lost) {
            SessionState::Authenticated(client) => client,
            SessionState::Selected(client) => client.close().await?,
            SessionState::Lost => {
                debug!("reconnecting after lost IMAP session");
                self.connector.login().await?
            }
            SessionState::LoggedOut => {
                self.state = SessionState::LoggedOut;
                return Err(Error::NotConnected);
            }
        };

        let (client, status) = client.select(folder).await?;
        self.state = SessionState::Selected(client);
        self.touch();
        Ok(FolderInfo {
            name: folder.to_string(),
            uid_validity: status.uid_validity.unwrap_or_default(),
            exists: status.exists,
        })
    }

    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        let client = self.selected().await?;
        Ok(client.uid_search(SearchCriteria::Since(since)).await?)
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<MailboxMessage>> {
        let client = self.selected().await?;
        let fetched = client.uid_fetch(uid).await?;
        Ok(fetched.map(|message| MailboxMessage {
            uid: message.uid,
            internal_date: message.internal_date.map(|date| date.with_timezone(&Utc)),
            seen: message.is_seen(),
            raw: message.body,
        }))
    }

    async fn mark_read(&mut self, uid: u32) -> Result<()> {
        let client = self.selected().await?;
        Ok(client.mark_seen(uid).await?)
    }

    async fn unlock_folder(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Lost) {
            SessionState::Selected(client) => {
                self.state = SessionState::Authenticated(client.close().await?);
            }
            other => self.state = other,
        }
        self.touch();
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::LoggedOut) {
            SessionState::Authenticated(client) => client.logout().await?,
            SessionState::Selected(client) => client.logout().await?,
            SessionState::Lost | SessionState::LoggedOut => {}
        }
        Ok(())
    }
}
