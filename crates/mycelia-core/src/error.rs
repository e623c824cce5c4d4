//! Shared error type across Mycelia crates.

use thiserror::Error;

/// Caller-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid input / malformed path, envelope, or report.
    BadRequest,
    /// No route matched the message path.
    NoRoute,
    /// Scope check failed or the kernel is draining.
    NotAllowed,
    /// Inbox is full and its overflow policy rejects.
    QueueFull,
    /// Inbox has been closed.
    QueueClosed,
    /// Reliable delivery deadline passed.
    Timeout,
    /// Unsupported envelope or config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON responses and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NoRoute => "NO_ROUTE",
            ErrorCode::NotAllowed => "NOT_ALLOWED",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::QueueClosed => "QUEUE_CLOSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MyceliaError>;

/// Unified error type used by core and kernel.
#[derive(Debug, Error)]
pub enum MyceliaError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no route: {0}")]
    NoRoute(String),
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("queue full")]
    QueueFull,
    #[error("queue closed")]
    QueueClosed,
    #[error("timed out")]
    Timeout,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl MyceliaError {
    /// Map internal error to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MyceliaError::BadRequest(_) => ErrorCode::BadRequest,
            MyceliaError::NoRoute(_) => ErrorCode::NoRoute,
            MyceliaError::NotAllowed(_) => ErrorCode::NotAllowed,
            MyceliaError::QueueFull => ErrorCode::QueueFull,
            MyceliaError::QueueClosed => ErrorCode::QueueClosed,
            MyceliaError::Timeout => ErrorCode::Timeout,
            MyceliaError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            MyceliaError::Internal(_) => ErrorCode::Internal,
        }
    }
}
