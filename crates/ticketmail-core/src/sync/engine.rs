//! One pass over the inbox and sent folders.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ticketmail_mime::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ingest::{external_id, extract_ticket_code, is_automated, truncate_quoted};
use super::mailbox::{FolderInfo, Mailbox, MailboxConnector, MailboxMessage};
use crate::Result;
use crate::config::{ImapSettings, SyncSettings};
use crate::model::{AccountId, NewReply, ReplySource};
use crate::store::{AccountDirectory, TicketRepository};

/// Counters for one folder.
///
/// `processed` counts every message examined without error; `skipped` and
/// `inserted` are subsets of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSummary {
    /// Folder name.
    pub folder: String,
    /// Messages examined.
    pub processed: usize,
    /// Messages that produced no reply.
    pub skipped: usize,
    /// Replies inserted.
    pub inserted: usize,
    /// Per-message and folder-level errors.
    pub errors: Vec<String>,
}

impl FolderSummary {
    fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            ..Self::default()
        }
    }

    fn record_error(&mut self, context: &str, err: &crate::Error) {
        warn!(folder = %self.folder, context, error = %err, "sync error");
        self.errors.push(format!("{} {context}: {err}", self.folder));
    }
}

/// Result of one engine pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Messages that arrived before this were ignored.
    pub window_start: DateTime<Utc>,
    /// Inbox counters.
    pub inbox: FolderSummary,
    /// Sent folder counters.
    pub sent: FolderSummary,
    /// The run stopped early on request.
    pub aborted: bool,
}

impl SyncRun {
    /// Whether any message or folder failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.inbox.errors.is_empty() || !self.sent.errors.is_empty()
    }

    /// Both folders' errors.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.inbox
            .errors
            .iter()
            .chain(&self.sent.errors)
            .cloned()
            .collect()
    }

    /// Messages examined in both folders.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.inbox.processed + self.sent.processed
    }

    /// Messages skipped in both folders.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.inbox.skipped + self.sent.skipped
    }

    /// Replies inserted in both folders.
    #[must_use]
    pub const fn inserted(&self) -> usize {
        self.inbox.inserted + self.sent.inserted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FolderKind {
    Inbox,
    Sent,
}

impl FolderKind {
    const fn source(self) -> ReplySource {
        match self {
            Self::Inbox => ReplySource::Inbox,
            Self::Sent => ReplySource::Sent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Inserted,
    Duplicate,
    /// Handled without a reply; the message is marked read.
    Skipped(&'static str),
    /// Not ours to handle; the message is left as it is.
    ///
    /// Mail whose subject carries no ticket code stops here without being
    /// marked read, so unrelated mail in a shared mailbox stays unread for
    /// its owner.
    Ignored(&'static str),
}

/// Turns mailbox messages into ticket replies.
pub struct SyncEngine {
    connector: Arc<dyn MailboxConnector>,
    tickets: Arc<dyn TicketRepository>,
    accounts: Arc<dyn AccountDirectory>,
    inbox_folder: String,
    sent_folder: String,
    default_staff_account_id: Option<AccountId>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("inbox_folder", &self.inbox_folder)
            .field("sent_folder", &self.sent_folder)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        tickets: Arc<dyn TicketRepository>,
        accounts: Arc<dyn AccountDirectory>,
        imap: &ImapSettings,
        sync: &SyncSettings,
    ) -> Self {
        Self {
            connector,
            tickets,
            accounts,
            inbox_folder: imap.inbox_folder.clone(),
            sent_folder: imap.sent_folder.clone(),
            default_staff_account_id: sync.default_staff_account_id,
        }
    }

    /// Runs one pass: inbox first, then the sent folder.
    ///
    /// Messages that arrived before `window_start` are ignored. Cancelling
    /// `cancel` stops between messages or drops the connection mid-command;
    /// either way the partial run is returned with `aborted` set.
    ///
    /// # Errors
    ///
    /// Returns connection-class failures. Everything else is recorded in the
    /// returned run.
    pub async fn run(
        &self,
        window_start: DateTime<Utc>,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SyncRun> {
        let mut run = SyncRun {
            started_at,
            window_start,
            inbox: FolderSummary::new(&self.inbox_folder),
            sent: FolderSummary::new(&self.sent_folder),
            aborted: false,
        };

        let connected = tokio::select! {
            () = cancel.cancelled() => None,
            mailbox = self.connector.connect() => Some(mailbox),
        };
        let Some(mailbox) = connected else {
            run.aborted = true;
            return Ok(run);
        };
        let mut mailbox = mailbox?;

        let scanned = tokio::select! {
            () = cancel.cancelled() => None,
            result = self.scan(mailbox.as_mut(), &mut run, cancel) => Some(result),
        };

        match scanned {
            None => {
                drop(mailbox);
                run.aborted = true;
                info!("sync aborted, mailbox connection dropped");
                Ok(run)
            }
            Some(result) => {
                if let Err(err) = mailbox.logout().await {
                    debug!(error = %err, "IMAP logout failed");
                }
                result?;
                run.aborted = cancel.is_cancelled();
                info!(
                    processed = run.processed(),
                    skipped = run.skipped(),
                    inserted = run.inserted(),
                    errors = run.inbox.errors.len() + run.sent.errors.len(),
                    aborted = run.aborted,
                    "sync pass finished"
                );
                Ok(run)
            }
        }
    }

    async fn scan(
        &self,
        mailbox: &mut dyn Mailbox,
        run: &mut SyncRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let window_start = run.window_start;
        let received_fallback = run.started_at;
        for (kind, summary) in [(FolderKind::Inbox, &mut run.inbox), (FolderKind::Sent, &mut run.sent)]
        {
            if cancel.is_cancelled() {
                break;
            }
            let ctx = ScanContext {
                kind,
                window_start,
                received_fallback,
                cancel,
            };
            match self.scan_folder(mailbox, &ctx, summary).await {
                Ok(()) => {}
                Err(err) if err.is_connection_failure() => return Err(err),
                Err(err) => summary.record_error("folder", &err),
            }
        }
        Ok(())
    }

    async fn scan_folder(
        &self,
        mailbox: &mut dyn Mailbox,
        ctx: &ScanContext<'_>,
        summary: &mut FolderSummary,
    ) -> Result<()> {
        let folder = mailbox.lock_folder(&summary.folder).await?;
        let scanned = self.scan_locked(mailbox, ctx, &folder, summary).await;
        let unlocked = mailbox.unlock_folder().await;
        scanned?;
        unlocked?;

        info!(
            folder = %summary.folder,
            processed = summary.processed,
            skipped = summary.skipped,
            inserted = summary.inserted,
            errors = summary.errors.len(),
            "folder scanned"
        );
        Ok(())
    }

    async fn scan_locked(
        &self,
        mailbox: &mut dyn Mailbox,
        ctx: &ScanContext<'_>,
        folder: &FolderInfo,
        summary: &mut FolderSummary,
    ) -> Result<()> {
        let uids = mailbox.search_since(ctx.window_start.date_naive()).await?;
        debug!(folder = %folder.name, candidates = uids.len(), "searching folder");

        for uid in uids {
            if ctx.cancel.is_cancelled() {
                debug!(folder = %folder.name, "abort requested, stopping folder scan");
                break;
            }

            match self.process(mailbox, ctx, folder, uid).await {
                Ok(disposition) => {
                    summary.processed += 1;
                    match disposition {
                        Disposition::Inserted => summary.inserted += 1,
                        Disposition::Duplicate => {
                            summary.skipped += 1;
                            debug!(uid, "reply already recorded");
                        }
                        Disposition::Skipped(reason) | Disposition::Ignored(reason) => {
                            summary.skipped += 1;
                            debug!(uid, reason, "message skipped");
                        }
                    }
                }
                Err(err) if err.is_connection_failure() => return Err(err),
                Err(err) => summary.record_error(&format!("uid {uid}"), &err),
            }
        }
        Ok(())
    }

    async fn process(
        &self,
        mailbox: &mut dyn Mailbox,
        ctx: &ScanContext<'_>,
        folder: &FolderInfo,
        uid: u32,
    ) -> Result<Disposition> {
        let Some(fetched) = mailbox.fetch(uid).await? else {
            return Ok(Disposition::Ignored("message vanished"));
        };
        if fetched
            .internal_date
            .is_some_and(|date| date < ctx.window_start)
        {
            return Ok(Disposition::Ignored("before sync window"));
        }

        let disposition = self.ingest(ctx, folder, &fetched).await?;
        if !matches!(disposition, Disposition::Ignored(_)) && !fetched.seen {
            mailbox.mark_read(uid).await?;
        }
        Ok(disposition)
    }

    async fn ingest(
        &self,
        ctx: &ScanContext<'_>,
        folder: &FolderInfo,
        fetched: &MailboxMessage,
    ) -> Result<Disposition> {
        let message = Message::parse(&fetched.raw)?;

        let Some(code) = message.subject().as_deref().and_then(extract_ticket_code) else {
            return Ok(Disposition::Ignored("no ticket reference"));
        };

        let text = message.plain_text().unwrap_or_default();
        if is_automated(&text) {
            return Ok(Disposition::Skipped("automated notification"));
        }

        let Some(ticket) = self.tickets.find_by_code(&code).await? else {
            return Ok(Disposition::Skipped("unknown ticket"));
        };

        let sender = match message.from_address() {
            Some(address) => self.accounts.find_by_email(&address).await?,
            None => None,
        };
        let authorized = match &sender {
            Some(account) => self.tickets.can_reply(account, &ticket).await?,
            None => false,
        };

        let author_id = match ctx.kind {
            FolderKind::Inbox if authorized => sender.map(|account| account.id),
            FolderKind::Inbox => None,
            FolderKind::Sent => match sender {
                Some(account) if authorized && account.role.is_staff() => Some(account.id),
                _ => self.default_staff().await?,
            },
        };
        let Some(author_id) = author_id else {
            return Ok(Disposition::Skipped("sender not authorized"));
        };

        let body = truncate_quoted(&text);
        if body.trim().is_empty() {
            return Ok(Disposition::Skipped("empty body"));
        }

        let external_id = external_id(
            message.message_id(),
            &folder.name,
            folder.uid_validity,
            fetched.uid,
        );
        if self.tickets.has_reply(&external_id).await? {
            return Ok(Disposition::Duplicate);
        }

        let received_at = fetched
            .internal_date
            .or_else(|| {
                message
                    .date()
                    .and_then(|date| DateTime::parse_from_rfc2822(date.trim()).ok())
                    .map(|date| date.with_timezone(&Utc))
            })
            .unwrap_or(ctx.received_fallback);

        let reply = NewReply {
            ticket_id: ticket.id,
            author_id,
            body,
            external_id,
            source: ctx.kind.source(),
            received_at,
        };
        if self.tickets.append_reply(&reply).await? {
            info!(ticket = %ticket.code, author = %author_id, source = reply.source.as_str(), "reply ingested");
            Ok(Disposition::Inserted)
        } else {
            Ok(Disposition::Duplicate)
        }
    }

    async fn default_staff(&self) -> Result<Option<AccountId>> {
        if let Some(id) = self.default_staff_account_id {
            return Ok(Some(id));
        }
        Ok(self
            .accounts
            .default_staff_account()
            .await?
            .map(|account| account.id))
    }
}

struct ScanContext<'a> {
    kind: FolderKind,
    window_start: DateTime<Utc>,
    received_fallback: DateTime<Utc>,
    cancel: &'a CancellationToken,
}
