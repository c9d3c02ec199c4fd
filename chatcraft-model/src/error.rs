//! Model-layer error conversions
//!
//! Re-exports chatcraft-error and maps provider failures onto error kinds.

pub use chatcraft_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

/// Map a provider failure onto the error taxonomy, once, at the client boundary
pub fn from_provider(err: ProviderError, provider: &str, model: &str) -> Error {
    let kind = match &err {
        ProviderError::Network(_) => ErrorKind::ModelUnavailable,
        ProviderError::Timeout => ErrorKind::ModelTimeout,
        ProviderError::Api { status, .. } if *status >= 500 => ErrorKind::ModelUnavailable,
        ProviderError::Api { .. } => ErrorKind::InferenceFailed,
        ProviderError::Parse(_) => ErrorKind::SerializationFailed,
        ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
        ProviderError::ModelNotFound(_) => ErrorKind::ModelNotFound,
        ProviderError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
        ProviderError::Other(_) => ErrorKind::InferenceFailed,
    };

    Error::new(kind, err.to_string())
        .with_operation("provider::complete")
        .with_context("provider", provider)
        .with_context("model", model)
        .set_source(err)
}
