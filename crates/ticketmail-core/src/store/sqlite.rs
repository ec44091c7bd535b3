//! `SQLite` implementation of every collaborator trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::{AccountDirectory, CheckpointStore, MailLog, SyncLog, TicketRepository};
use crate::Result;
use crate::model::{
    Account, AccountId, DispatchStatus, MailLogEntry, NewReply, Reply, Role, SyncLogEntry, Ticket,
    TicketId,
};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE COLLATE NOCASE,
        name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'client',
        is_default_staff INTEGER NOT NULL DEFAULT 0
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS tickets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE COLLATE NOCASE,
        owner_id INTEGER NOT NULL REFERENCES accounts(id),
        project_id INTEGER
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS ticket_assignees (
        ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        PRIMARY KEY (ticket_id, account_id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS ticket_replies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        author_id INTEGER NOT NULL REFERENCES accounts(id),
        body TEXT NOT NULL,
        external_id TEXT UNIQUE,
        source TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_ticket_replies_ticket
    ON ticket_replies(ticket_id, created_at)
    ",
    r"
    CREATE TABLE IF NOT EXISTS sync_checkpoint (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        synced_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS mail_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event TEXT NOT NULL,
        subject TEXT NOT NULL,
        recipients TEXT NOT NULL,
        status TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS sync_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trigger TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        processed INTEGER NOT NULL,
        skipped INTEGER NOT NULL,
        inserted INTEGER NOT NULL,
        errors TEXT NOT NULL,
        outcome TEXT NOT NULL
    )
    ",
];

/// Store backed by a `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("database schema ready");
        Ok(())
    }

    /// Inserts an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is taken or the query fails.
    pub async fn insert_account(&self, email: &str, name: &str, role: Role) -> Result<AccountId> {
        let result = sqlx::query("INSERT INTO accounts (email, name, role) VALUES (?, ?, ?)")
            .bind(email.trim().to_lowercase())
            .bind(name)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(AccountId(result.last_insert_rowid()))
    }

    /// Marks the account returned by
    /// [`AccountDirectory::default_staff_account`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn set_default_staff(&self, id: AccountId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE accounts SET is_default_staff = 0")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE accounts SET is_default_staff = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts a ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is taken or the query fails.
    pub async fn insert_ticket(
        &self,
        code: &str,
        owner_id: AccountId,
        project_id: Option<i64>,
    ) -> Result<TicketId> {
        let result =
            sqlx::query("INSERT INTO tickets (code, owner_id, project_id) VALUES (?, ?, ?)")
                .bind(code)
                .bind(owner_id.0)
                .bind(project_id)
                .execute(&self.pool)
                .await?;
        Ok(TicketId(result.last_insert_rowid()))
    }

    /// Assigns a staff account to a ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn assign(&self, ticket_id: TicketId, account_id: AccountId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO ticket_assignees (ticket_id, account_id) VALUES (?, ?)")
            .bind(ticket_id.0)
            .bind(account_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replies on a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn replies_for_ticket(&self, ticket_id: TicketId) -> Result<Vec<Reply>> {
        let rows = sqlx::query(
            r"
            SELECT id, ticket_id, author_id, body, external_id, source, created_at
            FROM ticket_replies
            WHERE ticket_id = ?
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_reply).collect())
    }

    /// Most recent mail log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_mail_log(&self, limit: u32) -> Result<Vec<MailLogEntry>> {
        let rows = sqlx::query(
            r"
            SELECT event, subject, recipients, status, error, created_at
            FROM mail_log
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_mail_log).collect())
    }

    /// Most recent sync log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_sync_log(&self, limit: u32) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query(
            r"
            SELECT trigger, started_at, finished_at, processed, skipped, inserted, errors, outcome
            FROM sync_log
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_sync_log).collect())
    }

    async fn assignees(&self, ticket_id: TicketId) -> Result<Vec<AccountId>> {
        let rows = sqlx::query(
            "SELECT account_id FROM ticket_assignees WHERE ticket_id = ? ORDER BY account_id",
        )
        .bind(ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AccountId(row.get("account_id")))
            .collect())
    }
}

#[async_trait]
impl TicketRepository for SqliteStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        let row = sqlx::query("SELECT id, code, owner_id, project_id FROM tickets WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id = TicketId(row.get("id"));
        Ok(Some(Ticket {
            id,
            code: row.get("code"),
            owner_id: AccountId(row.get("owner_id")),
            project_id: row.get("project_id"),
            assignee_ids: self.assignees(id).await?,
        }))
    }

    async fn has_reply(&self, external_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM ticket_replies WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn append_reply(&self, reply: &NewReply) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO ticket_replies
                (ticket_id, author_id, body, external_id, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(reply.ticket_id.0)
        .bind(reply.author_id.0)
        .bind(&reply.body)
        .bind(&reply.external_id)
        .bind(reply.source.as_str())
        .bind(reply.received_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountDirectory for SqliteStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, email, name, role FROM accounts WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_account))
    }

    async fn default_staff_account(&self) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, email, name, role
            FROM accounts
            WHERE role IN ('staff', 'admin')
            ORDER BY is_default_staff DESC, id ASC
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_account))
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn get(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT synced_at FROM sync_checkpoint WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| parse_timestamp(&row.get::<String, _>("synced_at"))))
    }

    async fn set(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sync_checkpoint (id, synced_at) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET synced_at = excluded.synced_at
            ",
        )
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MailLog for SqliteStore {
    async fn append(&self, entry: &MailLogEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO mail_log (event, subject, recipients, status, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&entry.event)
        .bind(&entry.subject)
        .bind(serde_json::to_string(&entry.recipients)?)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SyncLog for SqliteStore {
    async fn append(&self, entry: &SyncLogEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sync_log
                (trigger, started_at, finished_at, processed, skipped, inserted, errors, outcome)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&entry.trigger)
        .bind(entry.started_at.to_rfc3339())
        .bind(entry.finished_at.to_rfc3339())
        .bind(count_to_i64(entry.processed))
        .bind(count_to_i64(entry.skipped))
        .bind(count_to_i64(entry.inserted))
        .bind(serde_json::to_string(&entry.errors)?)
        .bind(&entry.outcome)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn count_to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn count_from_i64(n: i64) -> usize {
    usize::try_from(n).unwrap_or_default()
}

fn row_to_account(row: &SqliteRow) -> Account {
    Account {
        id: AccountId(row.get("id")),
        email: row.get("email"),
        name: row.get("name"),
        role: Role::parse(&row.get::<String, _>("role")),
    }
}

fn row_to_reply(row: &SqliteRow) -> Reply {
    Reply {
        id: row.get("id"),
        ticket_id: TicketId(row.get("ticket_id")),
        author_id: AccountId(row.get("author_id")),
        body: row.get("body"),
        external_id: row.get("external_id"),
        source: row.get("source"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
    }
}

fn row_to_mail_log(row: &SqliteRow) -> MailLogEntry {
    MailLogEntry {
        event: row.get("event"),
        subject: row.get("subject"),
        recipients: serde_json::from_str(&row.get::<String, _>("recipients")).unwrap_or_default(),
        status: DispatchStatus::parse(&row.get::<String, _>("status")),
        error: row.get("error"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
    }
}

fn row_to_sync_log(row: &SqliteRow) -> SyncLogEntry {
    SyncLogEntry {
        trigger: row.get("trigger"),
        started_at: parse_timestamp(&row.get::<String, _>("started_at")),
        finished_at: parse_timestamp(&row.get::<String, _>("finished_at")),
        processed: count_from_i64(row.get("processed")),
        skipped: count_from_i64(row.get("skipped")),
        inserted: count_from_i64(row.get("inserted")),
        errors: serde_json::from_str(&row.get::<String, _>("errors")).unwrap_or_default(),
        outcome: row.get("outcome"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ReplySource;
    use chrono::TimeZone;

    async fn seeded() -> (SqliteStore, AccountId, AccountId, TicketId) {
        let store = SqliteStore::in_memory().await.unwrap();
        let client = store
            .insert_account("Client@Example.com", "Client", Role::Client)
            .await
            .unwrap();
        let staff = store
            .insert_account("staff@example.com", "Staff", Role::Staff)
            .await
            .unwrap();
        let ticket = store.insert_ticket("AB12CD", client, Some(1)).await.unwrap();
        store.assign(ticket, staff).await.unwrap();
        (store, client, staff, ticket)
    }

    fn reply(ticket_id: TicketId, author_id: AccountId, external_id: &str) -> NewReply {
        NewReply {
            ticket_id,
            author_id,
            body: "Thanks".into(),
            external_id: external_id.into(),
            source: ReplySource::Inbox,
            received_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn ticket_lookup_ignores_case() {
        let (store, client, staff, ticket) = seeded().await;

        let found = store.find_by_code("ab12cd").await.unwrap().unwrap();
        assert_eq!(found.id, ticket);
        assert_eq!(found.owner_id, client);
        assert_eq!(found.assignee_ids, vec![staff]);
        assert!(store.find_by_code("ZZ99ZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn account_lookup_ignores_case() {
        let (store, client, _, _) = seeded().await;

        let account = store.find_by_email("CLIENT@example.com").await.unwrap().unwrap();
        assert_eq!(account.id, client);
        assert_eq!(account.email, "client@example.com");
        assert_eq!(account.role, Role::Client);
    }

    #[tokio::test]
    async fn append_reply_is_idempotent() {
        let (store, client, _, ticket) = seeded().await;

        assert!(!store.has_reply("<m1@example.com>").await.unwrap());
        assert!(store.append_reply(&reply(ticket, client, "<m1@example.com>")).await.unwrap());
        assert!(!store.append_reply(&reply(ticket, client, "<m1@example.com>")).await.unwrap());
        assert!(store.has_reply("<m1@example.com>").await.unwrap());

        let replies = store.replies_for_ticket(ticket).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].source, "email_inbox");
        assert_eq!(replies[0].created_at, reply(ticket, client, "").received_at);
    }

    #[tokio::test]
    async fn default_staff_prefers_flagged_account() {
        let (store, _, staff, _) = seeded().await;
        assert_eq!(store.default_staff_account().await.unwrap().unwrap().id, staff);

        let admin = store
            .insert_account("admin@example.com", "Admin", Role::Admin)
            .await
            .unwrap();
        store.set_default_staff(admin).await.unwrap();
        assert_eq!(store.default_staff_account().await.unwrap().unwrap().id, admin);
    }

    #[tokio::test]
    async fn checkpoint_is_a_single_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(CheckpointStore::get(&store).await.unwrap().is_none());

        let first = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();
        store.set(first).await.unwrap();
        store.set(second).await.unwrap();
        assert_eq!(CheckpointStore::get(&store).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn logs_keep_lists() {
        let store = SqliteStore::in_memory().await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        MailLog::append(
            &store,
            &MailLogEntry {
                event: "ticket_reply".into(),
                subject: "[Ticket #AB12CD] New reply".into(),
                recipients: vec!["a@example.com".into(), "b@example.com".into()],
                status: DispatchStatus::Sent,
                error: None,
                created_at: at,
            },
        )
        .await
        .unwrap();
        SyncLog::append(
            &store,
            &SyncLogEntry {
                trigger: "manual".into(),
                started_at: at,
                finished_at: at,
                processed: 3,
                skipped: 1,
                inserted: 2,
                errors: vec!["INBOX uid 7: boom".into()],
                outcome: "completed_with_errors".into(),
            },
        )
        .await
        .unwrap();

        let mail = store.recent_mail_log(10).await.unwrap();
        assert_eq!(mail[0].recipients.len(), 2);
        assert_eq!(mail[0].status, DispatchStatus::Sent);

        let sync = store.recent_sync_log(10).await.unwrap();
        assert_eq!(sync[0].inserted, 2);
        assert_eq!(sync[0].errors, vec!["INBOX uid 7: boom".to_string()]);
    }
}
