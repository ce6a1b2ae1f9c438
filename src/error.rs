//! Error taxonomy for identity provider calls.

use thiserror::Error;

/// Failure reported by an [`IdentityProvider`](crate::provider::IdentityProvider) call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The account already holds the maximum number of user-managed keys.
    #[error("key limit reached: {0}")]
    KeyLimitReached(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("aborted: {0}")]
    Aborted(String),

    /// Rate limiting or a transport hiccup that is safe to retry.
    #[error("retryable error: {0}")]
    Retryable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected provider response: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether the call may succeed if repeated after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_)
                | ProviderError::DeadlineExceeded(_)
                | ProviderError::Aborted(_)
                | ProviderError::Retryable(_)
        )
    }

    /// Classify a Google API error envelope.
    ///
    /// `status` is the canonical code string (`"PERMISSION_DENIED"`, ...) when
    /// the body carried one; otherwise the HTTP status decides.
    pub fn from_api(http_status: u16, status: Option<&str>, message: &str) -> Self {
        let msg = message.to_string();
        if mentions_key_limit(message) {
            return ProviderError::KeyLimitReached(msg);
        }
        match status {
            Some("PERMISSION_DENIED") | Some("UNAUTHENTICATED") => {
                ProviderError::PermissionDenied(msg)
            }
            Some("ALREADY_EXISTS") => ProviderError::AlreadyExists(msg),
            Some("INVALID_ARGUMENT") | Some("FAILED_PRECONDITION") | Some("OUT_OF_RANGE") => {
                ProviderError::InvalidArgument(msg)
            }
            Some("NOT_FOUND") => ProviderError::NotFound(msg),
            Some("UNAVAILABLE") => ProviderError::Unavailable(msg),
            Some("DEADLINE_EXCEEDED") => ProviderError::DeadlineExceeded(msg),
            Some("ABORTED") => ProviderError::Aborted(msg),
            Some("RESOURCE_EXHAUSTED") | Some("INTERNAL") => ProviderError::Retryable(msg),
            _ => Self::from_http_status(http_status, msg),
        }
    }

    fn from_http_status(http_status: u16, msg: String) -> Self {
        match http_status {
            400 => ProviderError::InvalidArgument(msg),
            401 | 403 => ProviderError::PermissionDenied(msg),
            404 => ProviderError::NotFound(msg),
            409 => ProviderError::AlreadyExists(msg),
            429 | 500 | 502 => ProviderError::Retryable(msg),
            503 => ProviderError::Unavailable(msg),
            504 => ProviderError::DeadlineExceeded(msg),
            _ => ProviderError::Other(format!("HTTP {}: {}", http_status, msg)),
        }
    }
}

fn mentions_key_limit(message: &str) -> bool {
    message.to_lowercase().contains("key limit reached")
}
