//! Collaborator interfaces and their `SQLite` implementation.
//!
//! The dispatcher and the sync engine only talk to these traits; the
//! ticket/account data itself is owned by the surrounding application.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::model::{Account, MailLogEntry, NewReply, SyncLogEntry, Ticket};

/// Ticket lookups and reply insertion.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Finds a ticket by its display code, ignoring case.
    async fn find_by_code(&self, code: &str) -> Result<Option<Ticket>>;

    /// Whether `account` may reply to `ticket`.
    ///
    /// Defaults to [`Ticket::accepts_reply_from`].
    async fn can_reply(&self, account: &Account, ticket: &Ticket) -> Result<bool> {
        Ok(ticket.accepts_reply_from(account))
    }

    /// Whether a reply with this external identifier already exists.
    async fn has_reply(&self, external_id: &str) -> Result<bool>;

    /// Appends a reply. Returns false when the external identifier was
    /// already recorded and nothing was inserted.
    async fn append_reply(&self, reply: &NewReply) -> Result<bool>;
}

/// Account lookups.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Finds an account by email address, ignoring case.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// The staff account used when sent mail cannot be attributed.
    async fn default_staff_account(&self) -> Result<Option<Account>>;
}

/// The single sync checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the checkpoint, `None` if never synced.
    async fn get(&self) -> Result<Option<DateTime<Utc>>>;

    /// Replaces the checkpoint.
    async fn set(&self, at: DateTime<Utc>) -> Result<()>;
}

/// Append-only record of dispatch attempts.
#[async_trait]
pub trait MailLog: Send + Sync {
    /// Appends an entry.
    async fn append(&self, entry: &MailLogEntry) -> Result<()>;
}

/// Append-only record of sync runs.
#[async_trait]
pub trait SyncLog: Send + Sync {
    /// Appends an entry.
    async fn append(&self, entry: &SyncLogEntry) -> Result<()>;
}
