//! Parsing of received messages.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::{Headers, extract_address};
use std::fmt;

/// Nesting limit for multipart bodies.
const MAX_DEPTH: usize = 8;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A leaf body part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, still transfer-encoded).
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, defaulting to `text/plain`.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns true if the part is marked as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("content-disposition")
            .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("attachment"))
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&String::from_utf8_lossy(&self.body)),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(&self.body),
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as text in its declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        let content_type = self.content_type();
        Ok(decode_charset(&decoded, content_type.charset().unwrap_or("utf-8")))
    }
}

/// A parsed message: top-level headers plus its leaf parts in document
/// order. Nested multiparts are flattened.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Leaf parts. A single-part message has exactly one.
    pub parts: Vec<Part>,
}

impl Message {
    /// Parses a raw RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart body has no boundary.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (header_bytes, body) = split_head(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes));

        let mut parts = Vec::new();
        collect_parts(headers.clone(), body, 0, &mut parts)?;

        Ok(Self { headers, parts })
    }

    /// Gets the decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// Gets the bare sender address from the From header.
    #[must_use]
    pub fn from_address(&self) -> Option<String> {
        self.headers.get("from").and_then(extract_address)
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers
            .get("message-id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Gets the Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get("date")
    }

    /// Finds the first inline text/plain part.
    #[must_use]
    pub fn text_part(&self) -> Option<String> {
        self.inline_text("plain")
    }

    /// Finds the first inline text/html part.
    #[must_use]
    pub fn html_part(&self) -> Option<String> {
        self.inline_text("html")
    }

    /// Returns the message text: the text/plain part when there is one,
    /// otherwise the HTML part converted to text.
    #[must_use]
    pub fn plain_text(&self) -> Option<String> {
        self.text_part()
            .or_else(|| self.html_part().map(|html| crate::html::html_to_text(&html)))
    }

    /// Iterates over parts marked as attachments.
    pub fn attachments(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|part| part.is_attachment())
    }

    fn inline_text(&self, sub_type: &str) -> Option<String> {
        self.parts
            .iter()
            .filter(|part| !part.is_attachment() && part.content_type().is("text", sub_type))
            .find_map(|part| part.body_text().ok())
    }
}

/// Splits at the first empty line. Accepts CRLF and bare LF.
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(rest) = raw.strip_prefix(b"\r\n").or_else(|| raw.strip_prefix(b"\n")) {
        return (&raw[..0], rest);
    }
    let crlf = find(raw, b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = find(raw, b"\n\n").map(|pos| (pos, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    split.map_or((raw, &raw[raw.len()..]), |(pos, len)| (&raw[..pos], &raw[pos + len..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn collect_parts(headers: Headers, body: &[u8], depth: usize, out: &mut Vec<Part>) -> Result<()> {
    let content_type = headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok());

    let Some(content_type) = content_type.filter(ContentType::is_multipart) else {
        out.push(Part::new(headers, body.to_vec()));
        return Ok(());
    };

    if depth >= MAX_DEPTH {
        return Err(Error::Parse("multipart nesting too deep".into()));
    }
    let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;

    for section in split_multipart(body, boundary) {
        let (head, part_body) = split_head(section);
        let part_headers = Headers::parse(&String::from_utf8_lossy(head));
        collect_parts(part_headers, part_body, depth + 1, out)?;
    }
    Ok(())
}

/// Returns the sections between `--boundary` delimiter lines, stopping at
/// the closing `--boundary--`. Preamble and epilogue are dropped.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut sections = Vec::new();
    let mut current: Option<usize> = None;
    let mut offset = 0;

    for line in body.split_inclusive(|&b| b == b'\n') {
        let trimmed = trim_line_end(line);
        if let Some(rest) = trimmed.strip_prefix(delimiter.as_bytes()) {
            let closing = rest.starts_with(b"--");
            if rest.iter().all(u8::is_ascii_whitespace) || closing {
                if let Some(start) = current.take() {
                    sections.push(trim_section_end(&body[start..offset]));
                }
                if closing {
                    return sections;
                }
                current = Some(offset + line.len());
            }
        }
        offset += line.len();
    }

    // Unterminated multipart: keep what we have.
    if let Some(start) = current {
        sections.push(&body[start..]);
    }
    sections
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Drops the line break that belongs to the following delimiter.
fn trim_section_end(section: &[u8]) -> &[u8] {
    section
        .strip_suffix(b"\r\n")
        .or_else(|| section.strip_suffix(b"\n"))
        .unwrap_or(section)
}
