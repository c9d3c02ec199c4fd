//! The workspace-wide `Error`

use crate::{ErrorKind, ErrorStatus};
use std::fmt;
use std::time::Duration;

/// Error raised anywhere in chatcraft.
///
/// Besides its [`ErrorKind`] and message, an error remembers the operation
/// that raised it (earlier operations move into the context as `called`),
/// key/value context such as the model name, and optionally the lower-level
/// error that caused it.
///
/// ```rust
/// use chatcraft_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::ModelUnavailable, "connection refused")
///     .with_operation("client::invoke")
///     .with_context("model", "gemma3:4b");
///
/// assert!(err.is_retryable());
/// assert_eq!(
///     err.to_string(),
///     "model unavailable: connection refused (client::invoke; model=gemma3:4b)"
/// );
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Status starts as `Temporary` for kinds that are worth retrying
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: if kind.is_retryable() {
                ErrorStatus::Temporary
            } else {
                ErrorStatus::Permanent
            },
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    /// Record the operation; a previously set one is kept as `called`.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error. Only one source may be set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// One line, message first: this is what the CLI shows the user.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.description())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }

        if self.operation.is_empty() && self.context.is_empty() {
            return Ok(());
        }

        write!(f, " ({}", self.operation)?;
        for (i, (key, value)) in self.context.iter().enumerate() {
            let sep = if i == 0 && !self.operation.is_empty() {
                "; "
            } else if i == 0 {
                ""
            } else {
                ", "
            };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Error");
        s.field("kind", &self.kind)
            .field("status", &self.status)
            .field("message", &self.message);
        if !self.operation.is_empty() {
            s.field("operation", &self.operation);
        }
        if !self.context.is_empty() {
            s.field("context", &self.context);
        }
        if let Some(source) = &self.source {
            s.field("source", &format_args!("{:#}", source));
        }
        s.finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// Constructors for the errors raised in more than one place.
impl Error {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn model_timeout(after: Duration) -> Self {
        let millis = after.as_millis();
        Self::new(
            ErrorKind::ModelTimeout,
            format!("no reply within {}ms", millis),
        )
        .with_context("timeout_ms", millis.to_string())
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    pub fn action_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::ActionNotFound, format!("no action named '{}'", name))
            .with_context("action", name)
    }

    pub fn duplicate_action(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::DuplicateAction, format!("'{}' is registered twice", name))
            .with_context("action", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_kind() {
        let err = Error::new(ErrorKind::ModelUnavailable, "backend down");
        assert_eq!(err.status(), ErrorStatus::Temporary);
        assert!(err.is_retryable());

        let err = Error::action_not_found("lights_on");
        assert_eq!(err.status(), ErrorStatus::Permanent);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_operation_chain_is_kept() {
        let err = Error::model_timeout(Duration::from_millis(1500))
            .with_operation("client::invoke")
            .with_operation("orchestrator::decide");

        assert_eq!(err.operation(), "orchestrator::decide");
        assert_eq!(
            err.context(),
            &[
                ("timeout_ms", "1500".to_string()),
                ("called", "client::invoke".to_string()),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::config_invalid("model.num_ctx must be greater than zero").to_string(),
            "invalid configuration: model.num_ctx must be greater than zero"
        );
        assert_eq!(
            Error::duplicate_action("get_weather")
                .with_operation("registry::register")
                .to_string(),
            "duplicate action: 'get_weather' is registered twice (registry::register; action=get_weather)"
        );
        assert_eq!(
            Error::action_not_found("x").to_string(),
            "action not found: no action named 'x' (action=x)"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "chatcraft.toml"));

        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }
}
