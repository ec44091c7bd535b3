//! Outbound notifications.
//!
//! [`MailEvent`]s are rendered into [`OutboundMessage`]s and handed to a
//! [`Transport`] by the [`Dispatcher`], which records every attempt.

mod dispatcher;
mod events;
mod message;
mod transport;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use events::{MailEvent, NOTIFICATION_SIGNATURE, ticket_tag};
pub use message::{
    AttachmentSource, MAX_RECIPIENTS, OutboundAttachment, OutboundMessage, normalize_recipients,
};
pub use transport::{SmtpTransport, Transport, compose, send_mail};
