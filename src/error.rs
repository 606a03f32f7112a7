//! Error handling and custom error types
//!
//! Provides unified error handling across the pipeline using thiserror.
//! Every error carries an [`ErrorKind`] decided where the failure is raised,
//! which is what the retry policy looks at.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry classification attached to every [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Likely to succeed if the whole sequence is tried again.
    Transient,
    /// Retrying will not help.
    Permanent,
    /// Local access was refused; surfaced to the caller immediately.
    Permission,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A single read strategy failed. Never escapes the reader.
    #[error("{strategy} failed: {message}")]
    Strategy {
        strategy: &'static str,
        message: String,
        kind: ErrorKind,
    },

    /// No read strategy produced any bytes; carries the last strategy's failure.
    #[error("Could not read {reference}: {message}")]
    Read {
        reference: String,
        message: String,
        kind: ErrorKind,
    },

    #[error("Stored object {key} is empty (0 bytes)")]
    ZeroByte { key: String },

    #[error("Store write error: {message}")]
    StoreWrite { message: String, kind: ErrorKind },

    #[error("Store error: {message}")]
    Store { message: String, kind: ErrorKind },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Unsupported image reference: {0}")]
    UnsupportedReference(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    pub fn strategy(strategy: &'static str, message: impl Into<String>, kind: ErrorKind) -> Self {
        Error::Strategy {
            strategy,
            message: message.into(),
            kind,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(e) => io_error_kind(e),
            Error::Http(e) => http_error_kind(e),
            Error::Strategy { kind, .. }
            | Error::Read { kind, .. }
            | Error::StoreWrite { kind, .. }
            | Error::Store { kind, .. } => *kind,
            Error::Permission(_) => ErrorKind::Permission,
            Error::Base64(_)
            | Error::ZeroByte { .. }
            | Error::UnsupportedReference(_)
            | Error::EnvVar(_)
            | Error::Config(_)
            | Error::Invariant(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub(crate) fn io_error_kind(e: &std::io::Error) -> ErrorKind {
    use std::io::ErrorKind as Io;
    match e.kind() {
        Io::PermissionDenied => ErrorKind::Permission,
        Io::TimedOut
        | Io::Interrupted
        | Io::WouldBlock
        | Io::ConnectionReset
        | Io::ConnectionAborted
        | Io::ConnectionRefused
        | Io::BrokenPipe
        | Io::UnexpectedEof => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

pub(crate) fn http_error_kind(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() {
        return ErrorKind::Transient;
    }
    match e.status() {
        Some(status) if status.is_server_error() || status.as_u16() == 429 => {
            ErrorKind::Transient
        }
        Some(_) => ErrorKind::Permanent,
        // Requests that died mid-flight without a status
        None if e.is_request() => ErrorKind::Transient,
        None => ErrorKind::Permanent,
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_permission_denied_is_permission() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_io_timeout_is_transient() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_file_is_permanent() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_zero_byte_is_never_transient() {
        let err = Error::ZeroByte {
            key: "bike_42_1.jpg".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("0 bytes"));
    }

    #[test]
    fn test_read_error_keeps_assigned_kind() {
        let err = Error::Read {
            reference: "file:///tmp/a.jpg".to_string(),
            message: "buffered_fetch failed: connection reset".to_string(),
            kind: ErrorKind::Transient,
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("file:///tmp/a.jpg"));
    }
}
