//! IMAP commands and their wire form.

mod tag_generator;
mod utf7;

pub use tag_generator::TagGenerator;
pub use utf7::encode_mailbox_name;

use chrono::NaiveDate;

/// Criteria for `UID SEARCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message in the mailbox.
    All,
    /// Messages whose internal date is on or after the given day.
    Since(NaiveDate),
    /// Messages without the `\Seen` flag.
    Unseen,
}

impl SearchCriteria {
    fn write(self, buf: &mut Vec<u8>) {
        match self {
            Self::All => buf.extend_from_slice(b"ALL"),
            Self::Unseen => buf.extend_from_slice(b"UNSEEN"),
            Self::Since(date) => {
                buf.extend_from_slice(b"SINCE ");
                buf.extend_from_slice(format_date(date).as_bytes());
            }
        }
    }
}

/// Formats a date as an IMAP `date` (`1-Feb-2024`).
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// Items requested by [`Command::UidFetch`].
pub const FETCH_ITEMS: &str = "(UID FLAGS INTERNALDATE BODY.PEEK[])";

/// IMAP commands used by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY
    Capability,
    /// NOOP
    Noop,
    /// STARTTLS
    StartTls,
    /// LOGIN with plain credentials.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT (read-write).
    Select {
        /// Mailbox name in UTF-8; encoded on the wire.
        mailbox: String,
    },
    /// UID SEARCH.
    UidSearch(SearchCriteria),
    /// UID FETCH of a whole message without setting `\Seen`.
    UidFetch {
        /// Message UID.
        uid: u32,
    },
    /// UID STORE +FLAGS.SILENT.
    UidStore {
        /// Message UID.
        uid: u32,
        /// Flags to add, e.g. `\Seen`.
        flags: Vec<String>,
    },
    /// CLOSE
    Close,
    /// LOGOUT
    Logout,
}

impl Command {
    /// Serializes the command with its tag, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, &encode_mailbox_name(mailbox));
            }
            Self::UidSearch(criteria) => {
                buf.extend_from_slice(b"UID SEARCH ");
                criteria.write(&mut buf);
            }
            Self::UidFetch { uid } => {
                buf.extend_from_slice(format!("UID FETCH {uid} {FETCH_ITEMS}").as_bytes());
            }
            Self::UidStore { uid, flags } => {
                buf.extend_from_slice(format!("UID STORE {uid} +FLAGS.SILENT (").as_bytes());
                buf.extend_from_slice(flags.join(" ").as_bytes());
                buf.push(b')');
            }
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command as it may appear in logs.
    #[must_use]
    pub fn redacted(&self, tag: &str) -> String {
        match self {
            Self::Login { username, .. } => format!("{tag} LOGIN {username} ***"),
            other => String::from_utf8_lossy(&other.serialize(tag))
                .trim_end()
                .to_string(),
        }
    }
}

/// Writes an astring, quoting it when it contains special characters.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}
