//! What went wrong

use std::fmt;

/// Error categories callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Catch-all for failures nothing else describes
    Unexpected,
    ConfigInvalid,

    // model backend
    /// Connection refused, DNS failure, 5xx
    ModelUnavailable,
    ModelTimeout,
    ModelNotFound,
    /// The backend answered but the reply is unusable
    InferenceFailed,
    RateLimited,
    AuthenticationFailed,

    // actions
    /// A `tool_code` block outside the call grammar
    MalformedCall,
    /// Qualified names, dunder names, nested calls, several statements
    UnsafeCallRejected,
    ActionNotFound,
    HandlerError,
    DuplicateAction,

    // io
    FileNotFound,
    PermissionDenied,
    IoFailed,

    // data
    ParseFailed,
    SerializationFailed,
    InvalidArgument,
}

impl ErrorKind {
    /// Variant name, for logs and matching in scripts
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::ModelUnavailable => "ModelUnavailable",
            ErrorKind::ModelTimeout => "ModelTimeout",
            ErrorKind::ModelNotFound => "ModelNotFound",
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::MalformedCall => "MalformedCall",
            ErrorKind::UnsafeCallRejected => "UnsafeCallRejected",
            ErrorKind::ActionNotFound => "ActionNotFound",
            ErrorKind::HandlerError => "HandlerError",
            ErrorKind::DuplicateAction => "DuplicateAction",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::InvalidArgument => "InvalidArgument",
        }
    }

    /// Lower-case phrase used when showing an error to a person
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "unexpected error",
            ErrorKind::ConfigInvalid => "invalid configuration",
            ErrorKind::ModelUnavailable => "model unavailable",
            ErrorKind::ModelTimeout => "model timed out",
            ErrorKind::ModelNotFound => "model not found",
            ErrorKind::InferenceFailed => "inference failed",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::AuthenticationFailed => "authentication failed",
            ErrorKind::MalformedCall => "malformed call",
            ErrorKind::UnsafeCallRejected => "unsafe call rejected",
            ErrorKind::ActionNotFound => "action not found",
            ErrorKind::HandlerError => "action failed",
            ErrorKind::DuplicateAction => "duplicate action",
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::IoFailed => "i/o failed",
            ErrorKind::ParseFailed => "parse failed",
            ErrorKind::SerializationFailed => "bad backend payload",
            ErrorKind::InvalidArgument => "invalid argument",
        }
    }

    /// Kinds where the same call may succeed a moment later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ModelUnavailable
                | ErrorKind::ModelTimeout
                | ErrorKind::InferenceFailed
                | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
