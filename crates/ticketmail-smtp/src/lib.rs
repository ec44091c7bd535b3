//! # ticketmail-smtp
//!
//! SMTP client session used by the ticket mail dispatcher.
//!
//! ## Features
//!
//! - **FIFO reply pairing**: every command registers an expectation (the set of
//!   acceptable reply codes) in a strict queue; server replies are matched
//!   against the oldest pending expectation only
//! - **Line framing**: inbound bytes are buffered and split on CRLF, with
//!   `DDD-` continuation lines accumulated until the terminal `DDD ` line
//! - **TLS support**: implicit TLS (port 465) and in-place STARTTLS upgrade
//! - **DATA transfer**: line-ending normalization and dot-stuffing
//! - **Authentication**: PLAIN and LOGIN
//!
//! ## Quick Start
//!
//! ```ignore
//! use ticketmail_smtp::{Session, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> ticketmail_smtp::Result<()> {
//!     let options = SessionOptions::default();
//!     let mut session = Session::open("smtp.example.com", 587, false, &options).await?;
//!
//!     session.greeting().await?;
//!     session.hello("client.example.com").await?;
//!     session.starttls("smtp.example.com").await?;
//!     session.hello("client.example.com").await?;
//!     session.authenticate("user@example.com", "password").await?;
//!
//!     session.command(Some("MAIL FROM:<user@example.com>"), &[250]).await?;
//!     session.command(Some("RCPT TO:<friend@example.com>"), &[250, 251]).await?;
//!     session.command(Some("DATA"), &[354]).await?;
//!     session.send_data(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Streams, the expectation queue and the protocol session
//! - [`data`]: DATA body encoding (dot-stuffing)
//! - [`parser`]: Reply line framing and parsing
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod data;
mod error;
pub mod parser;
pub mod types;

pub use command::Command;
pub use connection::{
    ExpectationQueue, ReplyReceiver, ServerInfo, Session, SessionOptions, SmtpStream, Timeouts,
    TlsOptions,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
