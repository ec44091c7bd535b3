//! Domain types shared by the stores, the dispatcher and the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an account is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Customer who owns tickets.
    #[default]
    Client,
    /// Staff member working on assigned tickets.
    Staff,
    /// Administrator; counts as staff.
    Admin,
}

impl Role {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "staff" => Self::Staff,
            "admin" => Self::Admin,
            _ => Self::Client,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Staff and admins.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }
}

/// A known account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Identifier.
    pub id: AccountId,
    /// Lowercased email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role.
    pub role: Role,
}

/// The parts of a ticket the sync engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Identifier.
    pub id: TicketId,
    /// Display code, as used in `[Ticket #<code>]`.
    pub code: String,
    /// Owning client account.
    pub owner_id: AccountId,
    /// Project the ticket belongs to, if any.
    pub project_id: Option<i64>,
    /// Assigned staff accounts.
    pub assignee_ids: Vec<AccountId>,
}

impl Ticket {
    /// Whether `account` may reply to this ticket.
    ///
    /// Clients may reply to tickets they own. Staff may reply to tickets
    /// they are assigned to, and to any ticket without a project.
    #[must_use]
    pub fn accepts_reply_from(&self, account: &Account) -> bool {
        if account.role.is_staff() {
            self.project_id.is_none() || self.assignee_ids.contains(&account.id)
        } else {
            self.owner_id == account.id
        }
    }
}

/// Where an ingested reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// Client mail in the inbox folder.
    Inbox,
    /// Staff mail in the sent folder.
    Sent,
}

impl ReplySource {
    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "email_inbox",
            Self::Sent => "email_sent",
        }
    }
}

/// A reply to append to a ticket timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReply {
    /// Target ticket.
    pub ticket_id: TicketId,
    /// Author account.
    pub author_id: AccountId,
    /// Plain-text body with quoted content removed.
    pub body: String,
    /// Message identifier used for deduplication.
    pub external_id: String,
    /// Folder the message came from.
    pub source: ReplySource,
    /// When the message arrived.
    pub received_at: DateTime<Utc>,
}

/// A stored ticket reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Row identifier.
    pub id: i64,
    /// Ticket.
    pub ticket_id: TicketId,
    /// Author.
    pub author_id: AccountId,
    /// Body text.
    pub body: String,
    /// Deduplication key, when ingested from mail.
    pub external_id: Option<String>,
    /// Source tag.
    pub source: String,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Accepted by the relay.
    Sent,
    /// Not attempted (configuration gap or no recipients).
    Skipped,
    /// Attempted and failed.
    Error,
}

impl DispatchStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "skipped" => Self::Skipped,
            _ => Self::Error,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

/// One row of the mail log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailLogEntry {
    /// Event kind, e.g. `ticket_reply`.
    pub event: String,
    /// Subject line.
    pub subject: String,
    /// Normalized recipients.
    pub recipients: Vec<String>,
    /// Outcome.
    pub status: DispatchStatus,
    /// Error text for `Error` and `Skipped` outcomes.
    pub error: Option<String>,
    /// When the attempt finished.
    pub created_at: DateTime<Utc>,
}

/// One row of the sync log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogEntry {
    /// `timer` or `manual`.
    pub trigger: String,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Messages processed across both folders.
    pub processed: usize,
    /// Messages skipped across both folders.
    pub skipped: usize,
    /// Replies inserted across both folders.
    pub inserted: usize,
    /// Error descriptions.
    pub errors: Vec<String>,
    /// `completed`, `completed_with_errors`, `failed` or `aborted`.
    pub outcome: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip_and_staff() {
        for role in [Role::Client, Role::Staff, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), role);
        }
        assert!(Role::Admin.is_staff());
        assert!(!Role::Client.is_staff());
        assert_eq!(Role::parse("unknown"), Role::Client);
    }

    fn account(id: i64, role: Role) -> Account {
        Account {
            id: AccountId(id),
            email: format!("user{id}@example.com"),
            name: format!("User {id}"),
            role,
        }
    }

    #[test]
    fn reply_authorization() {
        let mut ticket = Ticket {
            id: TicketId(1),
            code: "AB12CD".into(),
            owner_id: AccountId(10),
            project_id: Some(3),
            assignee_ids: vec![AccountId(20)],
        };

        assert!(ticket.accepts_reply_from(&account(10, Role::Client)));
        assert!(!ticket.accepts_reply_from(&account(11, Role::Client)));
        assert!(ticket.accepts_reply_from(&account(20, Role::Staff)));
        assert!(!ticket.accepts_reply_from(&account(21, Role::Staff)));

        ticket.project_id = None;
        assert!(ticket.accepts_reply_from(&account(21, Role::Admin)));
        assert!(!ticket.accepts_reply_from(&account(11, Role::Client)));
    }

    #[test]
    fn dispatch_status_strings() {
        assert_eq!(DispatchStatus::parse("sent"), DispatchStatus::Sent);
        assert_eq!(DispatchStatus::Skipped.as_str(), "skipped");
    }
}
