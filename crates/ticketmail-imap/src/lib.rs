//! # ticketmail-imap
//!
//! A small async IMAP4rev1 client covering what mailbox synchronization
//! needs: LOGIN, SELECT, `UID SEARCH`, `UID FETCH BODY.PEEK[]`,
//! `UID STORE +FLAGS`, NOOP, CLOSE and LOGOUT over plain, STARTTLS or
//! implicit TLS connections.
//!
//! The client uses the type-state pattern, so commands are only callable in
//! the connection state where they are valid.
//!
//! ## Example
//!
//! ```ignore
//! use ticketmail_imap::{Config, SearchCriteria, connect};
//!
//! let client = connect(&Config::new("imap.example.com")).await?;
//! let client = client.login("support@example.com", "password").await?;
//! let (mut inbox, status) = client.select("INBOX").await?;
//! for uid in inbox.uid_search(SearchCriteria::Since(since)).await? {
//!     if let Some(message) = inbox.uid_fetch(uid).await? {
//!         // handle message.body
//!         inbox.mark_seen(uid).await?;
//!     }
//! }
//! inbox.close().await?.logout().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
mod types;

pub use command::{Command, SearchCriteria, encode_mailbox_name};
pub use connection::{
    Authenticated, Client, Config, ImapStream, NotAuthenticated, Security, Selected, Timeouts,
    TlsOptions, connect,
};
pub use error::{Error, Result};
pub use types::{FetchedMessage, MailboxStatus};
