//! Server replies as the session hands them to callers.

use std::fmt;

/// A complete reply: the code of the terminal line plus the text of every
/// line with its `DDD-` or `DDD ` prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Code shared by all lines.
    pub code: ReplyCode,
    /// Text per line.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Whether the code is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// All lines joined with `\n`.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

/// Three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220, greeting and STARTTLS go-ahead.
    pub const SERVICE_READY: Self = Self(220);
    /// 221, answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 235, authentication accepted.
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250, command completed.
    pub const OK: Self = Self(250);
    /// 251, recipient not local but will be forwarded.
    pub const FORWARD: Self = Self(251);
    /// 334, next SASL challenge.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354, send the message body.
    pub const START_DATA: Self = Self(354);
    /// 500, command not recognized. EHLO falls back to HELO on it.
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 502, command not implemented. EHLO falls back to HELO on it.
    pub const NOT_IMPLEMENTED: Self = Self(502);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// The leading digit: 2 done, 3 more input needed, 4 try again later,
    /// 5 rejected for good.
    #[must_use]
    pub const fn class(self) -> u16 {
        self.0 / 100
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(ReplyCode::START_DATA.class(), 3);
        assert!(ReplyCode::FORWARD.is_success());
        assert!(!ReplyCode::new(554).is_success());
    }

    #[test]
    fn multi_line_text() {
        let reply = Reply::new(
            ReplyCode::OK,
            vec!["relay.test".into(), "8BITMIME".into(), "AUTH PLAIN".into()],
        );
        assert_eq!(reply.message_text(), "relay.test\n8BITMIME\nAUTH PLAIN");
        assert_eq!(reply.code.to_string(), "250");
    }
}
