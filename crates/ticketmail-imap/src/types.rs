//! Values returned by the client.

use chrono::{DateTime, FixedOffset};

/// State reported by SELECT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Mailbox name as requested.
    pub name: String,
    /// Number of messages.
    pub exists: u32,
    /// UIDVALIDITY; UIDs are only stable while it is unchanged.
    pub uid_validity: Option<u32>,
    /// Predicted next UID.
    pub uid_next: Option<u32>,
}

/// A message fetched with `BODY.PEEK[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Message UID.
    pub uid: u32,
    /// Flags at fetch time.
    pub flags: Vec<String>,
    /// Server-side arrival time.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// Raw RFC 5322 message.
    pub body: Vec<u8>,
}

impl FetchedMessage {
    /// Returns true if the message carries `\Seen`.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|flag| flag.eq_ignore_ascii_case("\\Seen"))
    }
}
