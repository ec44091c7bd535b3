//! SMTP reply framing and parsing.
//!
//! Inbound bytes arrive in arbitrary chunks. [`LineBuffer`] turns them into
//! complete CRLF-terminated lines, [`classify_line`] tells continuation lines
//! (`250-...`) from terminal ones (`250 ...`), and [`parse_reply`] folds the
//! accumulated lines of one reply into a [`Reply`].

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Upper bound for a single unterminated line held in the buffer.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Buffers raw socket bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes and returns every line completed by them, without the
    /// trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if an unterminated line grows past the size limit.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.pending.drain(..pos + 2).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }

        if self.pending.len() > MAX_LINE_LENGTH {
            self.pending.clear();
            return Err(Error::Protocol("reply line too long".into()));
        }

        Ok(lines)
    }

    /// Returns true if no partial line is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Shape of a single reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `DDD-text`: more lines of the same reply follow.
    Continuation,
    /// `DDD text` or bare `DDD`: last line of the reply.
    Final,
    /// Anything else.
    Malformed,
}

/// Classifies a reply line.
#[must_use]
pub fn classify_line(line: &str) -> LineKind {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return LineKind::Malformed;
    }

    match bytes.get(3) {
        None | Some(b' ') => LineKind::Final,
        Some(b'-') => LineKind::Continuation,
        Some(_) => LineKind::Malformed,
    }
}

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// The code is taken from the terminal line.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let last = lines
        .last()
        .ok_or_else(|| Error::Protocol("Empty reply".into()))?;

    if classify_line(last) == LineKind::Malformed {
        return Err(Error::Protocol(format!("Malformed reply line: {last}")));
    }

    let code = last[0..3]
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {last}")))?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        match classify_line(line) {
            LineKind::Malformed => {
                return Err(Error::Protocol(format!("Malformed reply line: {line}")));
            }
            _ => message.push(line.get(4..).unwrap_or_default().to_string()),
        }
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn buffer_splits_on_crlf_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"250-smtp.exa").unwrap().is_empty());
        let lines = buffer.push(b"mple.com\r\n250 OK\r\n2").unwrap();
        assert_eq!(lines, vec!["250-smtp.example.com", "250 OK"]);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.push(b"21 bye\r\n").unwrap(), vec!["221 bye"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_keeps_bare_lf_inside_line() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"250 a\nb").unwrap().is_empty());
        assert_eq!(buffer.push(b"\r\n").unwrap(), vec!["250 a\nb"]);
    }

    #[test]
    fn buffer_rejects_runaway_line() {
        let mut buffer = LineBuffer::new();
        let junk = vec![b'x'; MAX_LINE_LENGTH + 1];
        assert!(buffer.push(&junk).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn classify() {
        assert_eq!(classify_line("250 OK"), LineKind::Final);
        assert_eq!(classify_line("250"), LineKind::Final);
        assert_eq!(classify_line("250-PIPELINING"), LineKind::Continuation);
        assert_eq!(classify_line("25"), LineKind::Malformed);
        assert_eq!(classify_line("ABC OK"), LineKind::Malformed);
        assert_eq!(classify_line("250xOK"), LineKind::Malformed);
    }

    #[test]
    fn parse_single_line_reply() {
        let reply = parse_reply(&["250 OK".to_string()]).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn parse_multi_line_reply() {
        let lines = vec![
            "250-smtp.example.com".to_string(),
            "250-STARTTLS".to_string(),
            "250 AUTH PLAIN LOGIN".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.message,
            vec!["smtp.example.com", "STARTTLS", "AUTH PLAIN LOGIN"]
        );
    }

    #[test]
    fn parse_bare_code() {
        let reply = parse_reply(&["354".to_string()]).unwrap();
        assert_eq!(reply.code.as_u16(), 354);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn parse_errors() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&["25".to_string()]).is_err());
        assert!(parse_reply(&["ABC OK".to_string()]).is_err());
    }
}
