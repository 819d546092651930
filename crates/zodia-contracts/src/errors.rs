use thiserror::Error;

/// Failure taxonomy for one pipeline call. Every error propagates typed to
/// the caller; there is no partial result and no silent fallback between
/// backends.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Bad or missing mode/credential/input. Surfaced immediately, never
    /// retried, and raised before any network call is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credential rejected by a paid provider (401/403-class). Never retried.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Transient provider-side failure (429, 5xx, connection refused).
    /// Retried within the bounded budget, then surfaced.
    #[error("provider failure: {0}")]
    Service(String),

    /// Network deadline exceeded. `charge_safe` is true only when the
    /// failure happened before the request went out, i.e. a retry cannot
    /// double-bill the account.
    #[error("deadline exceeded: {message}")]
    Timeout { message: String, charge_safe: bool },

    /// Free-path rendering or local persistence failure. Indicates an
    /// environment problem, not a transient condition; never retried.
    #[error("local rendering failed: {0}")]
    LocalRender(String),
}

impl GenerationError {
    pub fn timeout(message: impl Into<String>, charge_safe: bool) -> Self {
        GenerationError::Timeout {
            message: message.into(),
            charge_safe,
        }
    }

    /// Whether the retry loop may attempt this call again without risking a
    /// duplicate charge.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Service(_) => true,
            GenerationError::Timeout { charge_safe, .. } => *charge_safe,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GenerationError;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(GenerationError::Service("503".to_string()).is_retryable());
        assert!(GenerationError::timeout("connect", true).is_retryable());
        assert!(!GenerationError::timeout("read body", false).is_retryable());
        assert!(!GenerationError::Auth("401".to_string()).is_retryable());
        assert!(!GenerationError::Configuration("no key".to_string()).is_retryable());
        assert!(!GenerationError::LocalRender("disk".to_string()).is_retryable());
    }
}
