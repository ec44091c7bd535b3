//! Errors from composing and parsing messages.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong while building or reading a message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `Content-Type` value without a usable `type/subtype`.
    #[error("bad content type: {0}")]
    InvalidContentType(String),

    /// A transfer-encoded body or encoded word that does not decode.
    #[error("bad encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 payload rejected by the decoder.
    #[error("bad base64 payload: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// A multipart body whose content type names no boundary.
    #[error("multipart body without boundary")]
    MissingBoundary,

    /// A header the builder cannot do without.
    #[error("missing {0} header")]
    MissingHeader(String),

    /// Structurally broken message.
    #[error("malformed message: {0}")]
    Parse(String),
}
