//! Error types for the core library.

use std::io;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP conversation failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] ticketmail_smtp::Error),

    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] ticketmail_imap::Error),

    /// Message composition or parsing failed.
    #[error("MIME error: {0}")]
    Mime(#[from] ticketmail_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration that can never work.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A mailbox operation was attempted without an open connection.
    #[error("Mailbox not connected")]
    NotConnected,
}

/// Error codes that mark a failure as connection-class when they only
/// survive as text (wrapped errors, server messages).
const CONNECTION_ERROR_CODES: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "EHOSTUNREACH",
    "ENETUNREACH",
    "EAI_AGAIN",
];

impl Error {
    /// Returns true for failures of the connection itself: timeouts, resets,
    /// refused or unreachable hosts, dropped sockets.
    ///
    /// Inbound sync retries these once; anything else is not retried.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        let classified = match self {
            Self::Smtp(err) => err.is_connection_failure(),
            Self::Imap(err) => err.is_connection_failure(),
            Self::Io(err) => is_connection_io_error(err),
            Self::NotConnected => true,
            Self::Mime(_) | Self::Database(_) | Self::Serde(_) | Self::Config(_) => false,
        };
        classified || mentions_connection_code(&self.to_string())
    }
}

fn is_connection_io_error(err: &io::Error) -> bool {
    matches!(
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
    )
}

fn mentions_connection_code(text: &str) -> bool {
    CONNECTION_ERROR_CODES.iter().any(|code| text.contains(code))
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lower_layer_timeouts_are_connection_failures() {
        let smtp = Error::from(ticketmail_smtp::Error::Timeout(Duration::from_secs(1)));
        let imap = Error::from(ticketmail_imap::Error::Timeout(Duration::from_secs(1)));
        assert!(smtp.is_connection_failure());
        assert!(imap.is_connection_failure());
    }

    #[test]
    fn io_kinds() {
        assert!(Error::from(io::Error::from(io::ErrorKind::ConnectionRefused)).is_connection_failure());
        assert!(Error::from(io::Error::from(io::ErrorKind::HostUnreachable)).is_connection_failure());
        assert!(!Error::from(io::Error::from(io::ErrorKind::NotFound)).is_connection_failure());
    }

    #[test]
    fn error_codes_in_text() {
        let err = Error::from(io::Error::other("connect ECONNRESET 10.0.0.1:993"));
        assert!(err.is_connection_failure());
        let err = Error::Imap(ticketmail_imap::Error::No("getaddrinfo EAI_AGAIN imap.example.com".into()));
        assert!(err.is_connection_failure());
    }

    #[test]
    fn protocol_rejections_are_not() {
        let err = Error::Imap(ticketmail_imap::Error::No("[AUTHENTICATIONFAILED] bad".into()));
        assert!(!err.is_connection_failure());
        assert!(!Error::Config("interval must be positive".into()).is_connection_failure());
    }
}
