//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// A connect, greeting or socket read did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered a request with a code outside its expected set.
    #[error("Unexpected reply to {command} (expected {expected:?}): {line}")]
    UnexpectedReply {
        /// The request the reply was matched against (credentials redacted).
        command: String,
        /// Codes the request accepted.
        expected: Vec<u16>,
        /// Code the server actually sent.
        code: u16,
        /// Raw terminal reply line.
        line: String,
    },

    /// The connection ended while requests were still pending.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Protocol error (malformed reply, bad framing).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Returns the reply code for server rejections.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the error came from the transport rather than from a
    /// server reply: timeouts, resets, refused or dropped connections.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectionClosed(_) => true,
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::NetworkUnreachable
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rejection(code: u16) -> Error {
        Error::UnexpectedReply {
            command: "RCPT TO:<a@example.com>".into(),
            expected: vec![250, 251],
            code,
            line: format!("{code} nope"),
        }
    }

    #[test]
    fn exposes_reply_code() {
        assert_eq!(rejection(451).reply_code(), Some(451));
    }

    #[test]
    fn classifies_connection_failures() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_connection_failure());
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_connection_failure());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::InvalidData)).is_connection_failure());
        assert!(!rejection(421).is_connection_failure());
    }

    #[test]
    fn display_carries_raw_line() {
        let msg = rejection(554).to_string();
        assert!(msg.contains("554 nope"));
        assert!(msg.contains("RCPT TO"));
    }
}
