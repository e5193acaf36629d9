use thiserror::Error;

pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing or decoding PostgreSQL wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame length {0} below minimum of 8 bytes")]
    StartupTooShort(u32),

    #[error("startup frame length {0} exceeds sanity cap of {1} bytes")]
    StartupTooLong(u32, u32),

    #[error("frontend/backend frame length {0} below minimum of 4 bytes")]
    FrameTooShort(u32),

    #[error("unsupported GSSAPI encryption request")]
    GssapiUnsupported,

    #[error("malformed startup parameter list: {0}")]
    MalformedParams(String),

    #[error("startup parameters are not valid UTF-8")]
    InvalidUtf8,

    #[error("unexpected message type {0:?} while expecting {1}")]
    UnexpectedMessage(char, &'static str),

    #[error("value {0:?} is not a safe SQL literal")]
    UnsafeLiteral(String),

    #[error("identifier {0:?} is not a safe SQL identifier")]
    UnsafeIdentifier(String),

    #[error("connection closed before a complete message arrived")]
    Eof,
}
