use http::StatusCode;
use thiserror::Error;

/// Errors surfaced by adapters and the dispatcher
///
/// Vendor failures of every kind (HTTP, WebSocket, decoding, validation)
/// collapse into [`LlmError::Provider`], which always carries an HTTP-style
/// status.
#[derive(Debug, Error)]
pub enum LlmError {
    /// A vendor adapter failed
    #[error("{provider} error ({status}): {message}")]
    Provider {
        /// Provider name that produced the error
        provider: String,
        /// HTTP-style status code
        status: StatusCode,
        /// Human-readable description
        message: String,
    },

    /// The dispatcher has no adapter for this provider name
    #[error("provider '{provider}' is not supported")]
    ProviderNotSupported { provider: String },
}

impl LlmError {
    /// Request rejected before any network call (422)
    pub fn validation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: message.into(),
        }
    }

    /// Vendor reported a failure with its own status
    ///
    /// Statuses outside the valid HTTP range fall back to 500.
    pub fn upstream(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: message.into(),
        }
    }

    /// Unclassified failure: transport, decoding, or unexpected shape (500)
    pub fn internal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// HTTP-style status for this error
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Provider { status, .. } => *status,
            Self::ProviderNotSupported { .. } => StatusCode::NOT_FOUND,
        }
    }

    /// Machine-readable error category
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ProviderNotSupported { .. } => "not_found_error",
            Self::Provider { status, .. } if *status == StatusCode::UNPROCESSABLE_ENTITY => "invalid_request_error",
            Self::Provider { status, .. } if *status == StatusCode::INTERNAL_SERVER_ERROR => "internal_error",
            Self::Provider { .. } => "upstream_error",
        }
    }

    /// Message safe to show to an end user
    pub fn client_message(&self) -> String {
        match self {
            Self::Provider { message, .. } => message.clone(),
            other @ Self::ProviderNotSupported { .. } => other.to_string(),
        }
    }
}
