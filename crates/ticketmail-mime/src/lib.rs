//! # ticketmail-mime
//!
//! MIME composition and parsing for ticket notification mail.
//!
//! ## Features
//!
//! - **Message generation**: plain-text messages, attachments in a
//!   `multipart/mixed` body with a random boundary
//! - **Message parsing**: headers, nested multiparts, text/plain extraction
//!   with an HTML fallback
//! - **Encoding/Decoding**: Base64 (76-column lines), Quoted-Printable,
//!   RFC 2047 header encoding
//!
//! ## Quick Start
//!
//! ### Building
//!
//! ```ignore
//! use ticketmail_mime::{Attachment, MessageBuilder};
//!
//! let raw = MessageBuilder::new()
//!     .from(Some("Support"), "support@example.com")
//!     .to("client@example.com")
//!     .subject("[Ticket #AB12CD] New reply")
//!     .text_body("Hello")
//!     .attach(Attachment::new("offer.pdf", pdf_bytes))
//!     .build()?;
//! ```
//!
//! ### Parsing
//!
//! ```ignore
//! use ticketmail_mime::Message;
//!
//! let message = Message::parse(&raw)?;
//! println!("{:?}", message.subject());
//! println!("{:?}", message.plain_text());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;
pub mod html;

pub use builder::{Attachment, MessageBuilder};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::{Headers, extract_address};
pub use message::{Message, Part, TransferEncoding};
