use std::fmt;

/// Exhaustive error kinds at the core boundary.
///
/// Every subsystem crate converts its internal errors into one of these
/// kinds before returning across its public API. Internal plumbing is free
/// to use `anyhow`; this enum is the contract between subsystems.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Deliberately opaque: no decryption/verification failure distinguishes
    /// its cause in the error text, so callers cannot side-channel on it.
    #[error("crypto failure")]
    CryptoFailure,

    #[error("transport error (retryable): {0}")]
    TransportRetryable(String),

    #[error("transport error (terminal): {0}")]
    TransportTerminal(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("cancelled")]
    Cancelled,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransportRetryable(_) | Error::ResourceExhausted(_))
    }

    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(e.to_string()),
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(e.to_string()),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => {
                Error::TransportRetryable(e.to_string())
            }
            _ => Error::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
