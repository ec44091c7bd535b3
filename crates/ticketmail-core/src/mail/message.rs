//! Outbound message model and recipient normalization.

use std::collections::HashSet;
use std::path::PathBuf;

use ticketmail_mime::{Attachment, ContentType};
use ticketmail_smtp::Address;

use crate::Result;

/// Upper bound on addressees per message.
pub const MAX_RECIPIENTS: usize = 50;

/// Where attachment bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Already in memory.
    Memory(Vec<u8>),
    /// Read from disk at send time.
    File(PathBuf),
}

/// A file to attach to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundAttachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// Explicit content type; guessed from the file name when `None`.
    pub content_type: Option<ContentType>,
    /// Data source.
    pub source: AttachmentSource,
}

impl OutboundAttachment {
    /// Attachment held in memory.
    #[must_use]
    pub fn memory(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            source: AttachmentSource::Memory(data),
        }
    }

    /// Attachment read from `path` when the message is sent.
    #[must_use]
    pub fn file(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            source: AttachmentSource::File(path.into()),
        }
    }

    /// Overrides the guessed content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Loads the bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file source cannot be read.
    pub async fn load(&self) -> Result<Attachment> {
        let data = match &self.source {
            AttachmentSource::Memory(data) => data.clone(),
            AttachmentSource::File(path) => tokio::fs::read(path).await?,
        };
        let attachment = Attachment::new(self.filename.clone(), data);
        Ok(match &self.content_type {
            Some(content_type) => attachment.with_content_type(content_type.clone()),
            None => attachment,
        })
    }
}

/// A message ready to hand to a transport. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Attached files.
    pub attachments: Vec<OutboundAttachment>,
    /// Reply-To address.
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    /// Creates a message with normalized recipients.
    #[must_use]
    pub fn new<I, S>(recipients: I, subject: impl Into<String>, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            recipients: normalize_recipients(recipients),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
            reply_to: None,
        }
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: OutboundAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Sets the Reply-To address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Normalized recipients.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

/// Trims and lowercases addresses, drops anything the SMTP envelope would
/// reject, removes duplicates keeping first occurrence order, and caps the
/// list at [`MAX_RECIPIENTS`].
pub fn normalize_recipients<I, S>(recipients: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter_map(|addr| usable_address(addr.as_ref()))
        .filter(|addr| seen.insert(addr.clone()))
        .take(MAX_RECIPIENTS)
        .collect()
}

// Commas mean a header list slipped into a single entry.
fn usable_address(addr: &str) -> Option<String> {
    if addr.contains(',') {
        return None;
    }
    Address::new(addr).ok().map(|addr| addr.as_str().to_string())
}
