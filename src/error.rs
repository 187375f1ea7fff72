//! Error types for the invoice cache layer.

use std::fmt;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced to application features.
///
/// Every failure coming back from the remote record service is classified into one of
/// the first six variants. The remaining variants describe misuse of this crate itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The remote service could not be reached.
    ///
    /// Common causes:
    /// - Connection refused or reset
    /// - DNS failure
    /// - Transport timeout enforced by the caller
    ///
    /// **Recovery:** Retry at the call site. This crate never retries.
    Network(String),

    /// The active user is not allowed to perform the operation.
    PermissionDenied(String),

    /// The requested record does not exist on the remote service.
    NotFound(String),

    /// A record failed integrity checks or could not be decoded.
    ///
    /// Raised for single-record reads, create and update. During list reads
    /// malformed records are dropped instead and never surface as this error.
    DataFormat(String),

    /// The remote service reported an internal failure.
    Server(String),

    /// Fallback for failures that carry no usable classification.
    Unknown(String),

    /// The caller passed arguments that can never succeed (page 0, empty id, ...).
    InvalidArgument(String),

    /// Configuration error when building the repository.
    ///
    /// Common causes:
    /// - Zero max entries for a cache space
    /// - Malformed JSON configuration
    ///
    /// **Recovery:** Fix configuration and rebuild.
    Config(String),
}

/// Copyable tag for branching on an [`Error`] without matching its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    PermissionDenied,
    NotFound,
    DataFormat,
    Server,
    Unknown,
    InvalidArgument,
    Config,
}

impl Error {
    /// Classification tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DataFormat(_) => ErrorKind::DataFormat,
            Error::Server(_) => ErrorKind::Server,
            Error::Unknown(_) => ErrorKind::Unknown,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::DataFormat(msg) => write!(f, "Data format error: {}", msg),
            Error::Server(msg) => write!(f, "Server error: {}", msg),
            Error::Unknown(msg) => write!(f, "Unknown error: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
