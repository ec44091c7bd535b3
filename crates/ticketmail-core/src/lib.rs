//! # ticketmail-core
//!
//! Mail plumbing for the ticket desk.
//!
//! This crate provides:
//! - Configuration loading
//! - Collaborator traits for tickets, accounts, checkpoints and logs, with a
//!   `SQLite` implementation
//! - **Mail Dispatcher** - event notifications over SMTP, one log entry per
//!   attempt
//! - **Inbound Sync Engine** - turns inbox and sent-folder mail into ticket
//!   replies
//! - **Sync Scheduler** - timer and manual runs, abort, retries and
//!   checkpoints

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod mail;
pub mod model;
pub mod store;
pub mod sync;

pub use config::{Config, ImapSettings, Security, SmtpSettings, SyncSettings};
pub use error::{Error, Result};
pub use mail::{DispatchOutcome, Dispatcher, MailEvent, OutboundMessage};
pub use store::SqliteStore;
pub use sync::{Scheduler, SyncEngine, Trigger, TriggerResult};
