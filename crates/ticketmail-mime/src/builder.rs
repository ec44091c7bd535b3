//! Outgoing message composition.

use crate::content_type::ContentType;
use crate::encoding::{encode_base64_lines, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// Content type of the data.
    pub content_type: ContentType,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment, guessing the content type from the file name.
    #[must_use]
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = ContentType::from_filename(&filename);
        Self {
            filename,
            content_type,
            data,
        }
    }

    /// Overrides the guessed content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Builds a plain-text message, optionally with attachments.
///
/// Without attachments the result is a single `text/plain` body sent as
/// 8-bit text. With attachments it becomes `multipart/mixed` with a random
/// boundary and base64 attachment parts.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<(Option<String>, String)>,
    to: Vec<String>,
    reply_to: Option<String>,
    subject: String,
    text: String,
    attachments: Vec<Attachment>,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
    boundary: Option<String>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender with an optional display name.
    #[must_use]
    pub fn from(mut self, name: Option<&str>, address: impl Into<String>) -> Self {
        self.from = Some((name.map(str::to_string), address.into()));
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Sets the Reply-To address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fixes the Date header instead of using the current time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Fixes the Message-ID instead of generating one.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Fixes the multipart boundary instead of generating one.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender or every recipient is missing.
    pub fn build(&self) -> Result<Vec<u8>> {
        let (name, from) = self
            .from
            .as_ref()
            .ok_or_else(|| Error::MissingHeader("From".into()))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To".into()));
        }

        let mut headers = Headers::new();
        headers.add("From", format_mailbox(name.as_deref(), from));
        headers.add("To", self.to.join(", "));
        if let Some(reply_to) = &self.reply_to {
            headers.add("Reply-To", reply_to.clone());
        }
        headers.add("Subject", encode_rfc2047(&self.subject));
        headers.add("Date", self.date.unwrap_or_else(Utc::now).to_rfc2822());
        let message_id = self
            .message_id
            .clone()
            .unwrap_or_else(|| generate_message_id(from));
        headers.add("Message-ID", message_id);
        headers.add("MIME-Version", "1.0");

        let text = normalize_line_endings(&self.text);
        let mut out = String::new();

        if self.attachments.is_empty() {
            headers.add("Content-Type", ContentType::text_plain().to_string());
            headers.add("Content-Transfer-Encoding", "8bit");
            out.push_str(&headers.to_string());
            out.push_str("\r\n");
            out.push_str(&text);
            return Ok(out.into_bytes());
        }

        let boundary = self.boundary.clone().unwrap_or_else(generate_boundary);
        headers.add(
            "Content-Type",
            ContentType::multipart_mixed(boundary.clone()).to_string(),
        );
        out.push_str(&headers.to_string());
        out.push_str("\r\nThis is a multi-part message in MIME format.\r\n");

        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str(&format!("Content-Type: {}\r\n", ContentType::text_plain()));
        out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
        out.push_str(&text);
        if !text.ends_with("\r\n") {
            out.push_str("\r\n");
        }

        for attachment in &self.attachments {
            let filename = encode_rfc2047(&attachment.filename).replace("\r\n ", " ");
            let content_type = attachment
                .content_type
                .clone()
                .with_parameter("name", filename.clone());
            out.push_str(&format!("--{boundary}\r\n"));
            out.push_str(&format!("Content-Type: {content_type}\r\n"));
            out.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
            ));
            out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
            out.push_str(&encode_base64_lines(&attachment.data));
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{boundary}--\r\n"));

        Ok(out.into_bytes())
    }
}

fn format_mailbox(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) if name.is_ascii() && !name.contains(['"', '\\']) => {
            format!("\"{name}\" <{address}>")
        }
        Some(name) => format!("{} <{address}>", encode_rfc2047(name)),
        None => address.to_string(),
    }
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn generate_boundary() -> String {
    format!("----=_Part_{}", random_token(24))
}

fn generate_message_id(from: &str) -> String {
    let domain = from.rsplit_once('@').map_or("localhost", |(_, domain)| domain);
    format!(
        "<{}.{}@{domain}>",
        Utc::now().timestamp_millis(),
        random_token(16)
    )
}
