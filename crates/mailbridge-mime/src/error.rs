//! Why a message could not be decoded.

/// Decoding result.
pub type Result<T> = std::result::Result<T, Error>;

/// Decoding failures. Messages surface to callers verbatim.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Zero bytes.
    #[error("empty message")]
    Empty,

    /// Header block is not a header block.
    #[error("malformed header: {0}")]
    InvalidHeader(String),

    /// `Content-Type` without a usable `type/subtype`.
    #[error("malformed content type: {0}")]
    InvalidContentType(String),

    /// Quoted-printable or encoded-word payload that does not decode.
    #[error("undecodable transfer encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 payload that does not decode.
    #[error("undecodable base64 body: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Multipart body without a `boundary` parameter.
    #[error("multipart body has no boundary")]
    MissingBoundary,

    /// HTML body could not be rendered as text.
    #[error("HTML body could not be rendered: {0}")]
    Html(String),
}
